//! Session facade - the object a host UI holds per playback instance
//!
//! Every operation forwards to the active adapter (or ad overlay). The
//! session keeps no copy of backend state; it only remembers which adapter
//! is active and re-runs backend selection when the source changes.

use crate::adapter::{AdapterFactory, DashFactory, MediaAdapter, NativeFactory, StreamingEngineFactory};
use crate::ads::{AdBackend, AdOverlay, AdPhase, AdSdk};
use crate::config::{AdsConfig, StreamingConfig};
use crate::event::{BackendFamily, EventType, MediaEvent};
use crate::host::{HostEnv, ListenerId, MediaElement};
use crate::registry::{Pausable, SessionRegistry};
use crate::selector::{BackendSelector, Selection};
use crate::signal::Completion;
use crate::source::{LevelId, QualityLevel, Source};
use crate::subscription::Subscriptions;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Name reported when an ad tag is armed without an ad SDK
const AD_SDK: &str = "google.ima";

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whichever backend currently owns playback
enum Active {
    Direct(Rc<dyn MediaAdapter>),
    Overlay(Rc<AdOverlay>),
}

impl Active {
    fn adapter(&self) -> Rc<dyn MediaAdapter> {
        match self {
            Active::Direct(adapter) => adapter.clone(),
            Active::Overlay(overlay) => {
                let adapter: Rc<dyn MediaAdapter> = overlay.clone();
                adapter
            }
        }
    }
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    element: Rc<dyn MediaElement>,
    host: Rc<dyn HostEnv>,
    selector: BackendSelector,
    ads: Option<(Rc<dyn AdSdk>, AdsConfig)>,
    registry: Option<Rc<SessionRegistry>>,
}

impl SessionBuilder {
    /// Register the native adapter at the next priority slot
    pub fn native(mut self) -> Self {
        self.selector.register(Rc::new(NativeFactory::new()));
        self
    }

    /// Register the DASH adapter at the next priority slot
    pub fn dash(mut self, engines: Rc<dyn StreamingEngineFactory>, config: StreamingConfig) -> Self {
        let capabilities = self.host.capabilities();
        self.selector
            .register(Rc::new(DashFactory::new(engines, config, capabilities)));
        self
    }

    /// Register any other adapter factory
    pub fn factory(mut self, factory: Rc<dyn AdapterFactory>) -> Self {
        self.selector.register(factory);
        self
    }

    /// Enable the ad overlay; `config.tag_url` arms the first ad request
    pub fn ads(mut self, sdk: Rc<dyn AdSdk>, config: AdsConfig) -> Self {
        self.ads = Some((sdk, config));
        self
    }

    /// Use a registry other than the thread-wide one
    pub fn registry(mut self, registry: Rc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    pub fn build(self, sources: &[Source]) -> Result<Rc<Session>> {
        let ads = match self.ads {
            Some((sdk, config)) => {
                config.validate()?;
                Some(AdBackend::new(sdk, self.host.clone(), config))
            }
            None => None,
        };
        let ad_tag = ads
            .as_ref()
            .and_then(|ads| ads.config.active_tag().map(str::to_string));

        let selection = self.selector.select(self.element.as_ref(), sources)?;

        let session = Rc::new(Session {
            id: SessionId::new(),
            element: self.element,
            selector: self.selector,
            ads,
            ad_tag: RefCell::new(ad_tag),
            active: RefCell::new(None),
            registry: self.registry.unwrap_or_else(SessionRegistry::global),
            listeners: RefCell::new(Subscriptions::new()),
            loaded: Cell::new(false),
            destroyed: Cell::new(false),
        });

        let active = session.instantiate(selection);
        *session.active.borrow_mut() = Some(active);
        session.listen();

        let pausable: Rc<dyn Pausable> = session.clone();
        session.registry.insert(session.id, Rc::downgrade(&pausable));

        info!(session_id = %session.id, family = ?session.family(), "Session created");
        Ok(session)
    }
}

/// Playback session over one media element
pub struct Session {
    /// Unique session ID
    id: SessionId,
    /// Shared media element
    element: Rc<dyn MediaElement>,
    /// Adapter factories in priority order
    selector: BackendSelector,
    /// Resolved ad SDK, when ads are enabled
    ads: Option<AdBackend>,
    /// Tag consumed by the next adapter built
    ad_tag: RefCell<Option<String>>,
    active: RefCell<Option<Active>>,
    registry: Rc<SessionRegistry>,
    /// Listeners the session itself registered on the element
    listeners: RefCell<Subscriptions<ListenerId>>,
    loaded: Cell<bool>,
    destroyed: Cell<bool>,
}

impl Session {
    pub fn builder(element: Rc<dyn MediaElement>, host: Rc<dyn HostEnv>) -> SessionBuilder {
        SessionBuilder {
            element,
            host,
            selector: BackendSelector::new(),
            ads: None,
            registry: None,
        }
    }

    /// Get session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn instantiate(&self, selection: Selection) -> Active {
        let family = selection.family();
        let content = selection.factory.create(self.element.clone(), selection.source);
        let tag = self.ad_tag.borrow_mut().take();

        match (&self.ads, tag) {
            (Some(ads), Some(tag)) => {
                debug!(session_id = %self.id, %family, "Wrapping adapter in ad overlay");
                Active::Overlay(Rc::new(ads.wrap(content, self.element.clone(), &tag)))
            }
            _ => Active::Direct(content),
        }
    }

    fn listen(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let play = self.element.add_listener(
            EventType::Play.as_str(),
            Rc::new(move |_: &MediaEvent| {
                if let Some(session) = weak.upgrade() {
                    session.registry.pause_others(session.id);
                }
            }),
        );

        let weak = Rc::downgrade(self);
        let controls = self.element.add_listener(
            EventType::ControlsChanged.as_str(),
            Rc::new(move |_: &MediaEvent| {
                if let Some(session) = weak.upgrade() {
                    session.controls_changed();
                }
            }),
        );

        let mut listeners = self.listeners.borrow_mut();
        listeners.track(EventType::Play.as_str(), play);
        listeners.track(EventType::ControlsChanged.as_str(), controls);
    }

    /// Swap a finished overlay for its content adapter
    fn settle(&self) {
        let finished = match &*self.active.borrow() {
            Some(Active::Overlay(overlay)) if overlay.is_finished() => Some(overlay.clone()),
            _ => None,
        };
        if let Some(overlay) = finished {
            debug!(session_id = %self.id, "Ad session finished, unwrapping content");
            let content = overlay.detach();
            *self.active.borrow_mut() = Some(Active::Direct(content));
        }
    }

    fn adapter(&self) -> Option<Rc<dyn MediaAdapter>> {
        self.settle();
        self.active.borrow().as_ref().map(Active::adapter)
    }

    fn overlay(&self) -> Option<Rc<AdOverlay>> {
        match &*self.active.borrow() {
            Some(Active::Overlay(overlay)) => Some(overlay.clone()),
            _ => None,
        }
    }

    /// Family of the active backend; `Ads` while an overlay is in front
    pub fn family(&self) -> Option<BackendFamily> {
        self.adapter().map(|adapter| adapter.family())
    }

    /// Phase of the ad overlay, if one is active
    pub fn ad_phase(&self) -> Option<AdPhase> {
        self.settle();
        self.overlay().map(|overlay| overlay.phase())
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn load(&self) {
        if let Some(adapter) = self.adapter() {
            self.loaded.set(true);
            adapter.load();
        }
    }

    pub fn play(&self) {
        if let Some(adapter) = self.adapter() {
            adapter.play();
        }
    }

    pub fn pause(&self) {
        if let Some(adapter) = self.adapter() {
            adapter.pause();
        }
    }

    pub fn paused(&self) -> bool {
        self.adapter().map(|adapter| adapter.paused()).unwrap_or(true)
    }

    pub fn ended(&self) -> bool {
        self.adapter().map(|adapter| adapter.ended()).unwrap_or(false)
    }

    pub fn volume(&self) -> f64 {
        self.adapter()
            .map(|adapter| adapter.volume())
            .unwrap_or_else(|| self.element.volume())
    }

    pub fn set_volume(&self, volume: f64) {
        if let Some(adapter) = self.adapter() {
            adapter.set_volume(volume);
        }
    }

    pub fn muted(&self) -> bool {
        self.adapter()
            .map(|adapter| adapter.muted())
            .unwrap_or_else(|| self.element.muted())
    }

    pub fn set_muted(&self, muted: bool) {
        if let Some(adapter) = self.adapter() {
            adapter.set_muted(muted);
        }
    }

    pub fn levels(&self) -> Vec<QualityLevel> {
        self.adapter().map(|adapter| adapter.levels()).unwrap_or_default()
    }

    pub fn level(&self) -> LevelId {
        self.adapter().map(|adapter| adapter.level()).unwrap_or(LevelId::Auto)
    }

    pub fn set_level(&self, level: LevelId) {
        if let Some(adapter) = self.adapter() {
            adapter.set_level(level);
        }
    }

    pub fn source(&self) -> Option<Source> {
        self.adapter().map(|adapter| adapter.source())
    }

    /// Resolves once the active backend can report duration and levels
    pub fn ready(&self) -> Completion {
        self.adapter()
            .map(|adapter| adapter.ready())
            .unwrap_or_else(|| Completion::rejected("session destroyed"))
    }

    /// Arm an ad request for the next source assignment; `None` or an
    /// empty tag disarms it.
    ///
    /// Arming fails with [`Error::SdkUnavailable`] when the session was
    /// built without an ad SDK, and with [`Error::Url`] for a malformed tag.
    pub fn set_ad_tag(&self, tag: Option<&str>) -> Result<()> {
        let Some(tag) = tag.map(str::trim).filter(|tag| !tag.is_empty()) else {
            *self.ad_tag.borrow_mut() = None;
            return Ok(());
        };
        if self.ads.is_none() {
            warn!(session_id = %self.id, "Ad tag rejected: ads are not enabled");
            return Err(Error::SdkUnavailable {
                sdk: AD_SDK.to_string(),
            });
        }
        Url::parse(tag)?;
        *self.ad_tag.borrow_mut() = Some(tag.to_string());
        Ok(())
    }

    pub fn set_source(&self, source: Source) -> Result<()> {
        self.set_sources(&[source])
    }

    /// Re-run backend selection for new candidate sources.
    ///
    /// A same-family adapter takes the source in place when it can and no ad
    /// tag is armed; otherwise the active adapter is destroyed and a new one
    /// built, loaded if the session had been loaded.
    #[instrument(skip(self, sources), fields(session_id = %self.id))]
    pub fn set_sources(&self, sources: &[Source]) -> Result<()> {
        if self.destroyed.get() {
            return Err(Error::Internal("session destroyed".into()));
        }
        let selection = self.selector.select(self.element.as_ref(), sources)?;
        let ad_armed = self.ads.is_some() && self.ad_tag.borrow().is_some();
        let current = self.adapter();

        if let Some(current) = &current {
            if !ad_armed
                && current.family() == selection.family()
                && current.set_source(selection.source.clone())
            {
                info!(src = %selection.source.src, "Source replaced in place");
                return Ok(());
            }
        }

        if let Some(current) = current {
            current.destroy();
        }
        info!(family = %selection.family(), src = %selection.source.src, "Backend rebuilt for new source");
        let active = self.instantiate(selection);
        let adapter = active.adapter();
        *self.active.borrow_mut() = Some(active);

        if self.loaded.get() {
            adapter.load();
        }
        Ok(())
    }

    /// Host controls changed: echo `playing` when playback is running
    pub fn controls_changed(&self) {
        if !self.paused() {
            self.element.dispatch(MediaEvent::new(EventType::Playing));
        }
    }

    /// Subscriptions held by the session and its active backend
    pub fn subscription_count(&self) -> usize {
        let own = self.listeners.borrow().len();
        own + self
            .adapter()
            .map(|adapter| adapter.subscription_count())
            .unwrap_or(0)
    }

    /// Tear down the active backend and leave the registry. Idempotent.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }

        let listeners = self.listeners.borrow_mut().drain();
        for (_, id) in listeners {
            self.element.remove_listener(id);
        }

        let active = self.active.borrow_mut().take();
        if let Some(active) = active {
            active.adapter().destroy();
        }

        self.registry.remove(self.id);
        info!("Session destroyed");
    }
}

impl Pausable for Session {
    fn pause(&self) {
        Session::pause(self);
    }

    fn paused(&self) -> bool {
        Session::paused(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessAdSdk, HeadlessElement, HeadlessEngineFactory, HeadlessHost};
    use crate::source::{MIME_DASH, MIME_MP4};

    struct Fixture {
        element: Rc<HeadlessElement>,
        engines: Rc<HeadlessEngineFactory>,
        registry: Rc<SessionRegistry>,
        session: Rc<Session>,
    }

    fn fixture(sources: &[Source]) -> Fixture {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let registry = Rc::new(SessionRegistry::new());
        let session = Session::builder(element.clone(), Rc::new(HeadlessHost::new()))
            .dash(engines.clone(), StreamingConfig::default())
            .native()
            .registry(registry.clone())
            .build(sources)
            .unwrap();

        Fixture {
            element,
            engines,
            registry,
            session,
        }
    }

    #[test]
    fn test_build_registers_session() {
        let f = fixture(&[Source::new("a.mp4", MIME_MP4)]);
        assert_eq!(f.session.family(), Some(BackendFamily::Native));
        assert_eq!(f.registry.ids(), [f.session.id()]);
        assert_eq!(f.session.subscription_count(), 2);
    }

    #[test]
    fn test_same_family_source_replaced_in_place() {
        let f = fixture(&[Source::new("https://cdn.example/a.mpd", MIME_DASH)]);
        f.session.load();
        f.session
            .set_source(Source::new("https://cdn.example/b.mpd", MIME_DASH))
            .unwrap();

        assert_eq!(f.session.family(), Some(BackendFamily::Dash));
        assert_eq!(f.session.source().unwrap().src, "https://cdn.example/b.mpd");
        let engine = f.engines.last().unwrap();
        assert_eq!(engine.attached_sources(), ["https://cdn.example/b.mpd"]);
    }

    #[test]
    fn test_family_change_rebuilds_and_releases() {
        let f = fixture(&[Source::new("https://cdn.example/a.mpd", MIME_DASH)]);
        f.session.load();
        let dash_engine = f.engines.last().unwrap();

        f.session.set_source(Source::new("b.mp4", MIME_MP4)).unwrap();
        assert_eq!(f.session.family(), Some(BackendFamily::Native));
        assert_eq!(dash_engine.handler_count(), 0);
        assert_eq!(dash_engine.reset_count(), 1);

        // Rebuilt adapter is loaded because the session was
        assert_eq!(f.element.src(), "b.mp4");
        assert_eq!(f.element.listener_count_for("error"), 1);
    }

    #[test]
    fn test_unplayable_source_keeps_current_backend() {
        let f = fixture(&[Source::new("a.mp4", MIME_MP4)]);
        assert!(f.session.set_source(Source::new("a.mkv", "video/x-matroska")).is_err());
        assert_eq!(f.session.source().unwrap().src, "a.mp4");
    }

    #[test]
    fn test_ad_tag_wraps_next_adapter() {
        let element = Rc::new(HeadlessElement::new());
        let sdk = Rc::new(HeadlessAdSdk::new());
        let session = Session::builder(element.clone(), Rc::new(HeadlessHost::new()))
            .native()
            .ads(sdk.clone(), AdsConfig::default())
            .registry(Rc::new(SessionRegistry::new()))
            .build(&[Source::new("a.mp4", MIME_MP4)])
            .unwrap();
        assert_eq!(session.family(), Some(BackendFamily::Native));

        session.set_ad_tag(Some("https://ads.example/vmap.xml")).unwrap();
        session.set_source(Source::new("b.mp4", MIME_MP4)).unwrap();
        assert_eq!(session.family(), Some(BackendFamily::Ads));
        assert_eq!(session.ad_phase(), Some(AdPhase::Idle));

        session.load();
        assert_eq!(session.ad_phase(), Some(AdPhase::Requesting));
        assert_eq!(sdk.loader().unwrap().requests()[0].ad_tag_url, "https://ads.example/vmap.xml");
    }

    #[test]
    fn test_ad_tag_rejected_without_ad_sdk() {
        let f = fixture(&[Source::new("a.mp4", MIME_MP4)]);

        let armed = f.session.set_ad_tag(Some("https://ads.example/tag"));
        assert!(matches!(armed, Err(Error::SdkUnavailable { ref sdk }) if sdk == "google.ima"));

        f.session.set_source(Source::new("b.mp4", MIME_MP4)).unwrap();
        assert_eq!(f.session.family(), Some(BackendFamily::Native));
        assert_eq!(f.session.ad_phase(), None);

        // Disarming is always allowed
        f.session.set_ad_tag(None).unwrap();
        f.session.set_ad_tag(Some("  ")).unwrap();
    }

    #[test]
    fn test_malformed_ad_tag_rejected() {
        let element = Rc::new(HeadlessElement::new());
        let session = Session::builder(element, Rc::new(HeadlessHost::new()))
            .native()
            .ads(Rc::new(HeadlessAdSdk::new()), AdsConfig::default())
            .registry(Rc::new(SessionRegistry::new()))
            .build(&[Source::new("a.mp4", MIME_MP4)])
            .unwrap();

        let armed = session.set_ad_tag(Some("not a url"));
        assert!(matches!(armed, Err(Error::Url(_))));
        session.set_source(Source::new("b.mp4", MIME_MP4)).unwrap();
        assert_eq!(session.family(), Some(BackendFamily::Native));
    }

    #[test]
    fn test_invalid_ad_config_rejected() {
        let config = AdsConfig {
            remaining_time_poll_ms: 0,
            ..Default::default()
        };
        let result = Session::builder(Rc::new(HeadlessElement::new()), Rc::new(HeadlessHost::new()))
            .native()
            .ads(Rc::new(HeadlessAdSdk::new()), config)
            .build(&[Source::new("a.mp4", MIME_MP4)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_destroy_is_idempotent_and_leaves_registry() {
        let f = fixture(&[Source::new("a.mp4", MIME_MP4)]);
        f.session.load();
        f.session.destroy();
        f.session.destroy();

        assert!(f.session.is_destroyed());
        assert!(f.registry.is_empty());
        assert_eq!(f.element.listener_count(), 0);
        assert_eq!(f.session.subscription_count(), 0);
        assert!(f.session.paused());
        assert!(f.session.ready().is_settled());
        assert!(f.session.set_source(Source::new("b.mp4", MIME_MP4)).is_err());
    }
}
