//! Ad overlay controller
//!
//! Wraps one content adapter and drives the ad SDK through an ad break:
//!
//! ```text
//! Idle ─load()─▶ Requesting ─manager loaded─▶ Loaded ─init+start─▶ Playing
//!                                                                  │  ▲
//!                                         content pause requested  ▼  │ resume requested
//!                                                      ContentPauseRequested
//! any ─ad error / start failure─▶ content resumed ─manager released─▶ Completed
//! ```
//!
//! While `ads_active` is set, `play`/`pause` go to the ads manager. When the
//! break ends (or anything fails) the original content source is reloaded
//! into the content adapter and played, exactly once.

use super::engine::{
    AdDisplayContainer, AdError, AdEvent, AdEventType, AdSdk, AdsLoader, AdsManager, AdsManagerLoaded,
    AdsRenderingSettings, AdsRequest, ViewMode,
};
use crate::adapter::MediaAdapter;
use crate::config::AdsConfig;
use crate::event::{BackendEvent, BackendFamily, EventType, MediaEvent};
use crate::host::{HostEnv, ListenerId, MediaElement, OverlayContainer, TimerId};
use crate::normalizer::EventNormalizer;
use crate::signal::Completion;
use crate::source::{LevelId, QualityLevel, Source};
use crate::subscription::{SubscriptionId, Subscriptions};
use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, trace, warn};

/// Id of the container inserted after the media element
pub const AD_CONTAINER_ID: &str = "marquee-ads";

/// Marker class set on the element while an ad session is open
pub const AD_ACTIVE_CLASS: &str = "marquee-ads--active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdPhase {
    /// No ad request yet, or content owns playback between breaks
    Idle,
    Requesting,
    Loaded,
    Playing,
    ContentPauseRequested,
    /// Content resumed and the ads manager is gone
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdFlags {
    /// An ad break owns playback
    pub ads_active: bool,
    /// A content pause request has been seen
    pub ads_started: bool,
    /// The display container has been initialized
    pub ads_done: bool,
    pub ad_ended: bool,
    /// The running ad was paused by the host
    pub ad_paused: bool,
}

struct AdSession {
    phase: AdPhase,
    flags: AdFlags,
    tag_url: Option<String>,
    resume_to: Source,
    content_resumed: bool,
    container: Option<Box<dyn OverlayContainer>>,
    display: Option<Rc<dyn AdDisplayContainer>>,
    loader: Option<Rc<dyn AdsLoader>>,
    manager: Option<Rc<dyn AdsManager>>,
    loader_subscriptions: Subscriptions<SubscriptionId>,
    manager_subscriptions: Subscriptions<SubscriptionId>,
    ended_listener: Option<ListenerId>,
    resize_listener: Option<ListenerId>,
    timer: Option<TimerId>,
    remaining: Option<f64>,
}

impl AdSession {
    fn new(tag_url: String, resume_to: Source) -> Self {
        Self {
            phase: AdPhase::Idle,
            flags: AdFlags::default(),
            tag_url: Some(tag_url),
            resume_to,
            content_resumed: false,
            container: None,
            display: None,
            loader: None,
            manager: None,
            loader_subscriptions: Subscriptions::new(),
            manager_subscriptions: Subscriptions::new(),
            ended_listener: None,
            resize_listener: None,
            timer: None,
            remaining: None,
        }
    }

    /// Between `load()` and the first manager decision content is not bound yet
    fn awaiting_ads(&self) -> bool {
        !self.content_resumed && matches!(self.phase, AdPhase::Requesting | AdPhase::Loaded)
    }
}

struct Controller {
    session: RefCell<AdSession>,
    content: Rc<dyn MediaAdapter>,
    element: Rc<dyn MediaElement>,
    host: Rc<dyn HostEnv>,
    sdk: Rc<dyn AdSdk>,
    normalizer: EventNormalizer,
    config: AdsConfig,
}

impl Controller {
    #[instrument(skip(self))]
    fn load(self: &Rc<Self>) {
        let tag = {
            let session = self.session.borrow();
            if session.phase != AdPhase::Idle || session.content_resumed {
                return;
            }
            session.tag_url.clone()
        };
        let Some(tag) = tag else {
            self.resume_content();
            return;
        };
        info!(tag = %tag, "Requesting ads");

        let container = self.element.create_overlay(AD_CONTAINER_ID);
        self.element.set_class(AD_ACTIVE_CLASS, true);

        self.sdk.set_vpaid_insecure(self.config.vpaid_insecure);
        let display = self.sdk.create_display_container(container.as_ref());
        let loader = self.sdk.create_loader(&display);
        loader.disable_custom_playback_for_ios10_plus(true);

        let weak = Rc::downgrade(self);
        let error_id = loader.on_error(Rc::new(move |error: &AdError| {
            if let Some(controller) = weak.upgrade() {
                controller.on_ad_error(error);
            }
        }));
        let weak = Rc::downgrade(self);
        let loaded_id = loader.on_manager_loaded(Rc::new(move |loaded: Rc<dyn AdsManagerLoaded>| {
            if let Some(controller) = weak.upgrade() {
                controller.on_manager_loaded(loaded);
            }
        }));
        let weak = Rc::downgrade(self);
        let resize_id = self.host.on_resize(Rc::new(move || {
            if let Some(controller) = weak.upgrade() {
                controller.resize();
            }
        }));

        {
            let mut session = self.session.borrow_mut();
            session.loader_subscriptions.track("adError", error_id);
            session.loader_subscriptions.track("adsManagerLoaded", loaded_id);
            session.resize_listener = Some(resize_id);
            session.container = Some(container);
            session.display = Some(display);
            session.loader = Some(loader.clone());
            session.phase = AdPhase::Requesting;
        }

        self.watch_content_end();
        self.request_ads(&loader, tag);
    }

    fn request_ads(&self, loader: &Rc<dyn AdsLoader>, tag: String) {
        let size = self.element.container_size();
        let capabilities = self.host.capabilities();
        let request = AdsRequest {
            ad_tag_url: tag,
            linear_ad_slot_width: size.width,
            linear_ad_slot_height: size.height,
            non_linear_ad_slot_width: size.width,
            non_linear_ad_slot_height: self.config.non_linear_height,
            auto_play_allowed: capabilities.ad_autoplay_allowed(),
            play_muted: capabilities.ad_play_muted(),
        };
        debug!(?request, "Sending ads request");
        loader.request_ads(&request);
    }

    fn on_manager_loaded(self: &Rc<Self>, loaded: Rc<dyn AdsManagerLoaded>) {
        if self.session.borrow().phase != AdPhase::Requesting {
            debug!("Ignoring ads manager delivered after the request settled");
            return;
        }

        let settings = AdsRenderingSettings {
            restore_custom_playback_state_on_ad_break_complete: true,
        };
        let manager = match loaded.ads_manager(&settings) {
            Ok(manager) => manager,
            Err(error) => {
                self.on_ad_error(&error);
                return;
            }
        };

        {
            let mut session = self.session.borrow_mut();
            session.manager = Some(manager.clone());
            session.phase = AdPhase::Loaded;
        }
        self.subscribe_manager(&manager);
        self.start(&manager);
    }

    fn subscribe_manager(self: &Rc<Self>, manager: &Rc<dyn AdsManager>) {
        let mut registered = Vec::new();

        let weak = Rc::downgrade(self);
        registered.push((
            "adError",
            manager.on_error(Rc::new(move |error: &AdError| {
                if let Some(controller) = weak.upgrade() {
                    controller.on_ad_error(error);
                }
            })),
        ));

        let weak = Rc::downgrade(self);
        registered.push((
            AdEventType::ContentPauseRequested.sdk_name(),
            manager.on(
                AdEventType::ContentPauseRequested,
                Rc::new(move |event: &AdEvent| {
                    if let Some(controller) = weak.upgrade() {
                        controller.forward(event);
                        controller.on_content_pause_requested();
                    }
                }),
            ),
        ));

        let weak = Rc::downgrade(self);
        registered.push((
            AdEventType::ContentResumeRequested.sdk_name(),
            manager.on(
                AdEventType::ContentResumeRequested,
                Rc::new(move |event: &AdEvent| {
                    if let Some(controller) = weak.upgrade() {
                        controller.forward(event);
                        controller.on_content_resume_requested();
                    }
                }),
            ),
        ));

        let weak = Rc::downgrade(self);
        let lifecycle: Rc<dyn Fn(&AdEvent)> = Rc::new(move |event: &AdEvent| {
            if let Some(controller) = weak.upgrade() {
                controller.on_ad_event(event);
            }
        });
        for kind in AdEventType::LIFECYCLE {
            registered.push((kind.sdk_name(), manager.on(kind, lifecycle.clone())));
        }

        let mut session = self.session.borrow_mut();
        for (name, id) in registered {
            session.manager_subscriptions.track(name, id);
        }
    }

    fn start(&self, manager: &Rc<dyn AdsManager>) {
        let size = self.element.size();
        let started = manager
            .init(size.width, size.height, ViewMode::Normal)
            .and_then(|()| {
                {
                    let mut session = self.session.borrow_mut();
                    if session.manager.is_none() {
                        return Ok(());
                    }
                    session.flags.ads_active = true;
                }
                manager.start()
            });

        match started {
            Ok(()) => {
                let running = {
                    let mut session = self.session.borrow_mut();
                    if session.phase == AdPhase::Loaded {
                        session.phase = AdPhase::Playing;
                    }
                    session.manager.is_some()
                };
                if !running {
                    debug!("Ad error raised while starting, content already resumed");
                    return;
                }
                info!("Ad break started");
                self.element.dispatch(MediaEvent::new(EventType::Play));
            }
            Err(error) => {
                warn!(%error, "Ads manager failed to start, resuming content");
                self.release_manager();
                self.resume_content();
            }
        }
    }

    fn forward(&self, event: &AdEvent) {
        let ad = serde_json::to_value(&event.ad).unwrap_or(Value::Null);
        self.normalizer
            .forward(&BackendEvent::new(event.kind.canonical_name()).with_payload(json!({ "ad": ad })));
    }

    fn on_ad_event(self: &Rc<Self>, event: &AdEvent) {
        self.forward(event);

        match event.kind {
            AdEventType::Loaded if !event.is_linear() => {
                debug!("Non-linear ad loaded, content keeps playing");
                self.on_content_resume_requested();
            }
            AdEventType::Started if event.is_linear() => self.start_timer(),
            AdEventType::Complete if event.is_linear() => self.stop_timer(),
            AdEventType::AllAdsCompleted => {
                let resumed = self.session.borrow().content_resumed;
                if !resumed {
                    self.resume_content();
                }
                self.release_manager();
                self.session.borrow_mut().phase = AdPhase::Completed;
            }
            _ => {}
        }
    }

    fn on_ad_error(&self, ad_error: &AdError) {
        error!(code = ad_error.code, message = %ad_error.message, "Ad error");
        self.release_manager();
        self.resume_content();
    }

    fn on_content_pause_requested(&self) {
        self.unwatch_content_end();

        let first = {
            let mut session = self.session.borrow_mut();
            session.phase = AdPhase::ContentPauseRequested;
            if session.manager.is_some() {
                session.flags.ads_active = true;
            }
            let first = !session.flags.ads_started;
            session.flags.ads_started = true;
            first
        };

        if first {
            debug!("First content pause request arms the ad session");
        } else {
            debug!("Pausing content for ad break");
            self.content.pause();
        }
    }

    fn on_content_resume_requested(self: &Rc<Self>) {
        self.watch_content_end();
        self.resume_content();
    }

    /// Hand playback back to content. The source is reloaded only on the
    /// first resume; later breaks just continue the content adapter.
    fn resume_content(&self) {
        let (first_resume, source) = {
            let mut session = self.session.borrow_mut();
            session.flags.ad_ended = true;
            session.flags.ads_active = false;
            session.flags.ads_started = false;
            session.flags.ad_paused = false;
            session.tag_url = None;
            session.phase = if session.manager.is_some() {
                AdPhase::Idle
            } else {
                AdPhase::Completed
            };
            let first_resume = !session.content_resumed;
            session.content_resumed = true;
            (first_resume, session.resume_to.clone())
        };

        self.stop_timer();
        self.element.set_class(AD_ACTIVE_CLASS, false);

        if first_resume {
            info!(src = %source.src, "Resuming content");
            if self.content.source() != source && !self.content.set_source(source.clone()) {
                warn!(src = %source.src, "Content adapter refused the original source");
            }
            self.content.load();
        }
        self.content.play();
    }

    fn on_content_ended(&self) {
        let loader = {
            let mut session = self.session.borrow_mut();
            if session.flags.ads_active {
                debug!("Ignoring ended while an ad is in front of content");
                return;
            }
            session.flags.ad_ended = true;
            session.flags.ads_started = false;
            session.loader.clone()
        };
        if let Some(loader) = loader {
            loader.content_complete();
        }
    }

    fn watch_content_end(self: &Rc<Self>) {
        if self.session.borrow().ended_listener.is_some() {
            return;
        }
        let weak = Rc::downgrade(self);
        let id = self.element.add_listener(
            "ended",
            Rc::new(move |_: &MediaEvent| {
                if let Some(controller) = weak.upgrade() {
                    controller.on_content_ended();
                }
            }),
        );
        self.session.borrow_mut().ended_listener = Some(id);
    }

    fn unwatch_content_end(&self) {
        let id = self.session.borrow_mut().ended_listener.take();
        if let Some(id) = id {
            self.element.remove_listener(id);
        }
    }

    fn resize(&self) {
        let manager = self.session.borrow().manager.clone();
        if let Some(manager) = manager {
            let size = self.element.container_size();
            manager.resize(size.width, size.height, ViewMode::Normal);
        }
    }

    fn start_timer(self: &Rc<Self>) {
        if self.session.borrow().timer.is_some() {
            return;
        }
        let weak = Rc::downgrade(self);
        let id = self.host.set_interval(
            Duration::from_millis(self.config.remaining_time_poll_ms),
            Rc::new(move || {
                if let Some(controller) = weak.upgrade() {
                    controller.poll_remaining();
                }
            }),
        );
        self.session.borrow_mut().timer = Some(id);
    }

    fn stop_timer(&self) {
        let id = self.session.borrow_mut().timer.take();
        if let Some(id) = id {
            self.host.clear_interval(id);
        }
    }

    fn poll_remaining(&self) {
        let manager = self.session.borrow().manager.clone();
        let remaining = manager.and_then(|manager| manager.remaining_time());
        trace!(?remaining, "Ad remaining time");
        self.session.borrow_mut().remaining = remaining;
    }

    /// Unsubscribe from the ads manager, then destroy it
    fn release_manager(&self) {
        let (manager, subscriptions) = {
            let mut session = self.session.borrow_mut();
            (session.manager.take(), session.manager_subscriptions.drain())
        };
        self.stop_timer();
        if let Some(manager) = manager {
            for (_, id) in subscriptions {
                manager.off(id);
            }
            manager.destroy();
        }
    }

    /// Release everything the ad session holds; the content adapter is untouched
    fn teardown(&self) {
        self.stop_timer();
        self.unwatch_content_end();
        self.release_manager();

        let (resize, loader, loader_subscriptions, display, container) = {
            let mut session = self.session.borrow_mut();
            session.flags.ads_active = false;
            (
                session.resize_listener.take(),
                session.loader.take(),
                session.loader_subscriptions.drain(),
                session.display.take(),
                session.container.take(),
            )
        };

        if let Some(id) = resize {
            self.host.off_resize(id);
        }
        if let Some(loader) = loader {
            for (_, id) in loader_subscriptions {
                loader.off(id);
            }
            loader.destroy();
        }
        if let Some(display) = display {
            display.destroy();
        }
        if let Some(container) = container {
            container.remove();
        }
        self.element.set_class(AD_ACTIVE_CLASS, false);
    }

    fn play(&self) {
        let (display, manager, awaiting) = {
            let mut session = self.session.borrow_mut();
            let display = if !session.flags.ads_done && session.display.is_some() {
                session.flags.ads_done = true;
                session.display.clone()
            } else {
                None
            };
            let manager = if session.flags.ads_active {
                session.manager.clone()
            } else {
                None
            };
            (display, manager, session.awaiting_ads())
        };

        // Display container initialization needs the user gesture behind this call
        if let Some(display) = display {
            display.initialize();
        }

        if let Some(manager) = manager {
            manager.resume();
            self.session.borrow_mut().flags.ad_paused = false;
            self.element.dispatch(MediaEvent::new(EventType::Play));
        } else if awaiting {
            debug!("Play held until the ad request settles");
        } else {
            self.content.play();
        }
    }

    fn pause(&self) {
        let (manager, awaiting) = {
            let session = self.session.borrow();
            let manager = if session.flags.ads_active {
                session.manager.clone()
            } else {
                None
            };
            (manager, session.awaiting_ads())
        };

        if let Some(manager) = manager {
            manager.pause();
            self.session.borrow_mut().flags.ad_paused = true;
            self.element.dispatch(MediaEvent::new(EventType::Pause));
        } else if !awaiting {
            self.content.pause();
        }
    }

    fn paused(&self) -> bool {
        let (ad_state, awaiting) = {
            let session = self.session.borrow();
            let ad_state = session.flags.ads_active.then_some(session.flags.ad_paused);
            (ad_state, session.awaiting_ads())
        };
        match ad_state {
            Some(ad_paused) => ad_paused,
            None if awaiting => true,
            None => self.content.paused(),
        }
    }

    fn ended(&self) -> bool {
        let (resumed, ad_ended) = {
            let session = self.session.borrow();
            (session.content_resumed, session.flags.ad_ended)
        };
        if resumed {
            self.content.ended()
        } else {
            ad_ended
        }
    }

    fn subscription_count(&self) -> usize {
        let session = self.session.borrow();
        session.loader_subscriptions.len()
            + session.manager_subscriptions.len()
            + usize::from(session.ended_listener.is_some())
            + usize::from(session.resize_listener.is_some())
            + usize::from(session.timer.is_some())
    }
}

/// Ad overlay wrapping a content adapter.
///
/// Implements [`MediaAdapter`] so the session treats it like any backend.
pub struct AdOverlay {
    inner: Rc<Controller>,
}

impl AdOverlay {
    pub fn new(
        content: Rc<dyn MediaAdapter>,
        element: Rc<dyn MediaElement>,
        host: Rc<dyn HostEnv>,
        sdk: Rc<dyn AdSdk>,
        config: AdsConfig,
        tag_url: impl Into<String>,
    ) -> Self {
        let session = AdSession::new(tag_url.into(), content.source());
        let normalizer = EventNormalizer::new(element.clone(), BackendFamily::Ads);

        Self {
            inner: Rc::new(Controller {
                session: RefCell::new(session),
                content,
                element,
                host,
                sdk,
                normalizer,
                config,
            }),
        }
    }

    pub fn phase(&self) -> AdPhase {
        self.inner.session.borrow().phase
    }

    pub fn flags(&self) -> AdFlags {
        self.inner.session.borrow().flags
    }

    /// Ad tag still pending; cleared once content resumes
    pub fn tag_url(&self) -> Option<String> {
        self.inner.session.borrow().tag_url.clone()
    }

    /// Last polled remaining time of the running linear ad
    pub fn remaining_time(&self) -> Option<f64> {
        self.inner.session.borrow().remaining
    }

    /// Content resumed and no ads manager is left: the overlay can be dropped
    pub fn is_finished(&self) -> bool {
        let session = self.inner.session.borrow();
        session.content_resumed && session.manager.is_none()
    }

    pub fn content(&self) -> Rc<dyn MediaAdapter> {
        self.inner.content.clone()
    }

    /// Resize the ad surface to the container (window resize hook)
    pub fn resize(&self) {
        self.inner.resize();
    }

    /// Release the ad session and return the content adapter, still live
    pub fn detach(&self) -> Rc<dyn MediaAdapter> {
        self.inner.teardown();
        self.inner.content.clone()
    }
}

impl MediaAdapter for AdOverlay {
    fn family(&self) -> BackendFamily {
        BackendFamily::Ads
    }

    fn can_play_type(&self, mime: &str) -> bool {
        self.inner.content.can_play_type(mime)
    }

    fn load(&self) {
        self.inner.load();
    }

    fn source(&self) -> Source {
        self.inner.content.source()
    }

    fn set_source(&self, source: Source) -> bool {
        debug!(src = %source.src, "Ad overlay does not replace sources in place");
        false
    }

    fn play(&self) {
        self.inner.play();
    }

    fn pause(&self) {
        self.inner.pause();
    }

    fn paused(&self) -> bool {
        self.inner.paused()
    }

    fn ended(&self) -> bool {
        self.inner.ended()
    }

    fn volume(&self) -> f64 {
        self.inner.content.volume()
    }

    fn set_volume(&self, volume: f64) {
        self.inner.content.set_volume(volume);
    }

    fn muted(&self) -> bool {
        self.inner.content.muted()
    }

    fn set_muted(&self, muted: bool) {
        self.inner.content.set_muted(muted);
    }

    fn levels(&self) -> Vec<QualityLevel> {
        self.inner.content.levels()
    }

    fn level(&self) -> LevelId {
        self.inner.content.level()
    }

    fn set_level(&self, level: LevelId) {
        self.inner.content.set_level(level);
    }

    fn ready(&self) -> Completion {
        self.inner.content.ready()
    }

    fn subscription_count(&self) -> usize {
        self.inner.subscription_count() + self.inner.content.subscription_count()
    }

    fn destroy(&self) {
        self.inner.teardown();
        self.inner.content.destroy();
    }
}
