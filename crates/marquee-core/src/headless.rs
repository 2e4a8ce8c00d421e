//! In-memory host and engines
//!
//! Deterministic stand-ins for the page, dash.js and the IMA SDK. Used by the
//! test suites and by embedders that drive sessions outside a browser.
//!
//! Native state changes on [`HeadlessElement`] (`play`, `load`, `finish`,
//! `fail`) queue their DOM events the way a browser delivers them on a later
//! task; call [`HeadlessElement::run_pending`] to deliver them. Canonical
//! events passed to `dispatch` are delivered synchronously.

use crate::adapter::{BitrateInfo, EngineHandler, StreamingEngine, StreamingEngineFactory, TrackKind};
use crate::ads::{
    AdDisplayContainer, AdError, AdErrorHandler, AdEvent, AdEventHandler, AdEventType, AdSdk, AdsLoader,
    AdsManager, AdsManagerLoaded, AdsRenderingSettings, AdsRequest, ManagerLoadedHandler, ViewMode,
};
use crate::event::{EventType, MediaEvent};
use crate::host::{
    CanPlay, Capabilities, HostEnv, Listener, ListenerId, MediaElement, OverlayContainer, Size, TimerId,
};
use crate::subscription::SubscriptionId;
use serde_json::{json, Value};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// Types a desktop browser decodes without MSE
const NATIVE_TYPES: &[&str] = &["video/mp4", "video/webm", "video/ogg", "audio/mp4", "audio/mpeg", "audio/ogg"];

fn next(counter: &Cell<u64>) -> u64 {
    let id = counter.get() + 1;
    counter.set(id);
    id
}

// ============================================================================
// Element
// ============================================================================

/// In-memory media element
pub struct HeadlessElement {
    listeners: RefCell<Vec<(ListenerId, String, Listener)>>,
    next_id: Cell<u64>,
    playable: RefCell<Vec<String>>,
    src: RefCell<String>,
    paused: Cell<bool>,
    ended: Cell<bool>,
    volume: Cell<f64>,
    muted: Cell<bool>,
    error: RefCell<Option<String>>,
    size: Cell<Size>,
    container_size: Cell<Size>,
    classes: RefCell<BTreeSet<String>>,
    overlays: Rc<RefCell<Vec<String>>>,
    pending: RefCell<VecDeque<MediaEvent>>,
    dispatched: RefCell<Vec<MediaEvent>>,
    play_count: Cell<usize>,
    load_count: Cell<usize>,
}

impl Default for HeadlessElement {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessElement {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            playable: RefCell::new(NATIVE_TYPES.iter().map(|mime| mime.to_string()).collect()),
            src: RefCell::new(String::new()),
            paused: Cell::new(true),
            ended: Cell::new(false),
            volume: Cell::new(1.0),
            muted: Cell::new(false),
            error: RefCell::new(None),
            size: Cell::new(Size::new(640, 360)),
            container_size: Cell::new(Size::new(640, 360)),
            classes: RefCell::new(BTreeSet::new()),
            overlays: Rc::new(RefCell::new(Vec::new())),
            pending: RefCell::new(VecDeque::new()),
            dispatched: RefCell::new(Vec::new()),
            play_count: Cell::new(0),
            load_count: Cell::new(0),
        }
    }

    /// Replace the set of MIME types the element answers `maybe` for
    pub fn with_playable(self, types: &[&str]) -> Self {
        *self.playable.borrow_mut() = types.iter().map(|mime| mime.to_string()).collect();
        self
    }

    pub fn set_size(&self, size: Size) {
        self.size.set(size);
    }

    pub fn set_container_size(&self, size: Size) {
        self.container_size.set(size);
    }

    /// Deliver queued native events in order
    pub fn run_pending(&self) {
        loop {
            let event = self.pending.borrow_mut().pop_front();
            match event {
                Some(event) => self.dispatch(event),
                None => break,
            }
        }
    }

    /// Playback reached the end of the media
    pub fn finish(&self) {
        self.paused.set(true);
        self.ended.set(true);
        self.queue(EventType::Ended);
    }

    /// Raise a media error
    pub fn fail(&self, message: impl Into<String>) {
        *self.error.borrow_mut() = Some(message.into());
        self.queue(EventType::Other("error".into()));
    }

    /// Every event delivered so far
    pub fn dispatched(&self) -> Vec<MediaEvent> {
        self.dispatched.borrow().clone()
    }

    pub fn dispatched_types(&self) -> Vec<String> {
        self.dispatched
            .borrow()
            .iter()
            .map(|event| event.type_name().to_string())
            .collect()
    }

    pub fn clear_dispatched(&self) {
        self.dispatched.borrow_mut().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn listener_count_for(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, name, _)| name == event)
            .count()
    }

    /// Times `play()` started playback
    pub fn play_count(&self) -> usize {
        self.play_count.get()
    }

    pub fn load_count(&self) -> usize {
        self.load_count.get()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.borrow().contains(class)
    }

    /// Ids of overlay containers still attached
    pub fn overlays(&self) -> Vec<String> {
        self.overlays.borrow().clone()
    }

    fn queue(&self, event_type: EventType) {
        self.pending.borrow_mut().push_back(MediaEvent::new(event_type));
    }
}

impl MediaElement for HeadlessElement {
    fn add_listener(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(next(&self.next_id));
        self.listeners.borrow_mut().push((id, event.to_string(), listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(tracked, _, _)| *tracked != id);
    }

    fn dispatch(&self, event: MediaEvent) {
        self.dispatched.borrow_mut().push(event.clone());
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, name, _)| name == event.type_name())
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    fn src(&self) -> String {
        self.src.borrow().clone()
    }

    fn set_src(&self, src: &str) {
        *self.src.borrow_mut() = src.to_string();
    }

    fn load(&self) {
        self.load_count.set(self.load_count.get() + 1);
        self.paused.set(true);
        self.ended.set(false);
        *self.error.borrow_mut() = None;
        if !self.src.borrow().is_empty() {
            self.queue(EventType::LoadedMetadata);
        }
    }

    fn play(&self) {
        if !self.paused.get() {
            return;
        }
        self.paused.set(false);
        self.ended.set(false);
        self.play_count.set(self.play_count.get() + 1);
        self.queue(EventType::Play);
        self.queue(EventType::Playing);
    }

    fn pause(&self) {
        if self.paused.replace(true) {
            return;
        }
        self.queue(EventType::Pause);
    }

    fn paused(&self) -> bool {
        self.paused.get()
    }

    fn ended(&self) -> bool {
        self.ended.get()
    }

    fn volume(&self) -> f64 {
        self.volume.get()
    }

    fn set_volume(&self, volume: f64) {
        self.volume.set(volume);
    }

    fn muted(&self) -> bool {
        self.muted.get()
    }

    fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
    }

    fn can_play_type(&self, mime: &str) -> CanPlay {
        let playable = self
            .playable
            .borrow()
            .iter()
            .any(|known| known.eq_ignore_ascii_case(mime));
        if playable {
            CanPlay::Maybe
        } else {
            CanPlay::No
        }
    }

    fn error_message(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    fn size(&self) -> Size {
        self.size.get()
    }

    fn container_size(&self) -> Size {
        self.container_size.get()
    }

    fn set_class(&self, class: &str, enabled: bool) {
        let mut classes = self.classes.borrow_mut();
        if enabled {
            classes.insert(class.to_string());
        } else {
            classes.remove(class);
        }
    }

    fn create_overlay(&self, id: &str) -> Box<dyn OverlayContainer> {
        self.overlays.borrow_mut().push(id.to_string());
        Box::new(HeadlessOverlay {
            id: id.to_string(),
            attached: self.overlays.clone(),
        })
    }
}

/// Overlay container tracked by its element
pub struct HeadlessOverlay {
    id: String,
    attached: Rc<RefCell<Vec<String>>>,
}

impl OverlayContainer for HeadlessOverlay {
    fn id(&self) -> &str {
        &self.id
    }

    fn remove(&self) {
        self.attached.borrow_mut().retain(|id| *id != self.id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Host
// ============================================================================

/// In-memory page services with manually driven timers
pub struct HeadlessHost {
    capabilities: Cell<Capabilities>,
    timers: RefCell<Vec<(TimerId, Duration, Rc<dyn Fn()>)>>,
    resize: RefCell<Vec<(ListenerId, Rc<dyn Fn()>)>>,
    next_id: Cell<u64>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessHost {
    /// Desktop environment with Media Source Extensions
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities {
            media_source_extensions: true,
            is_chrome: true,
            ..Default::default()
        })
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            capabilities: Cell::new(capabilities),
            timers: RefCell::new(Vec::new()),
            resize: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Fire every live interval once
    pub fn tick(&self) {
        let ticks: Vec<Rc<dyn Fn()>> = self.timers.borrow().iter().map(|(_, _, tick)| tick.clone()).collect();
        for tick in ticks {
            tick();
        }
    }

    pub fn fire_resize(&self) {
        let listeners: Vec<Rc<dyn Fn()>> = self.resize.borrow().iter().map(|(_, listener)| listener.clone()).collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Periods of the live intervals
    pub fn timer_periods(&self) -> Vec<Duration> {
        self.timers.borrow().iter().map(|(_, period, _)| *period).collect()
    }

    pub fn resize_listener_count(&self) -> usize {
        self.resize.borrow().len()
    }
}

impl HostEnv for HeadlessHost {
    fn set_interval(&self, period: Duration, tick: Rc<dyn Fn()>) -> TimerId {
        let id = TimerId(next(&self.next_id));
        self.timers.borrow_mut().push((id, period, tick));
        id
    }

    fn clear_interval(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|(tracked, _, _)| *tracked != id);
    }

    fn on_resize(&self, listener: Rc<dyn Fn()>) -> ListenerId {
        let id = ListenerId(next(&self.next_id));
        self.resize.borrow_mut().push((id, listener));
        id
    }

    fn off_resize(&self, id: ListenerId) {
        self.resize.borrow_mut().retain(|(tracked, _)| *tracked != id);
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.get()
    }
}

// ============================================================================
// Streaming engine
// ============================================================================

/// Event names the headless engine reports
pub const ENGINE_EVENTS: &[&str] = &[
    "error",
    "playbackStarted",
    "playbackPaused",
    "playbackEnded",
    "playbackProgress",
    "qualityChangeRendered",
];

/// Recursively merge `patch` into `target`; objects merge, everything else replaces
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// In-memory streaming engine
pub struct HeadlessStreamingEngine {
    settings: RefCell<Value>,
    ladder: Vec<BitrateInfo>,
    initialized: Cell<bool>,
    view_attached: Cell<bool>,
    auto_play: Cell<Option<bool>>,
    sources: RefCell<Vec<String>>,
    quality: Cell<Option<usize>>,
    handlers: RefCell<Vec<(SubscriptionId, String, EngineHandler)>>,
    next_id: Cell<u64>,
    reset_count: Cell<usize>,
}

impl HeadlessStreamingEngine {
    pub fn new(ladder: Vec<BitrateInfo>) -> Self {
        Self {
            settings: RefCell::new(json!({
                "streaming": { "abr": { "autoSwitchBitrate": { "video": true, "audio": true } } }
            })),
            ladder,
            initialized: Cell::new(false),
            view_attached: Cell::new(false),
            auto_play: Cell::new(None),
            sources: RefCell::new(Vec::new()),
            quality: Cell::new(None),
            handlers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            reset_count: Cell::new(0),
        }
    }

    /// Deliver an event to the handlers registered for its name
    pub fn emit(&self, event: crate::event::BackendEvent) {
        let handlers: Vec<EngineHandler> = self
            .handlers
            .borrow()
            .iter()
            .filter(|(_, name, _)| *name == event.name)
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub fn is_view_attached(&self) -> bool {
        self.view_attached.get()
    }

    pub fn auto_play(&self) -> Option<bool> {
        self.auto_play.get()
    }

    pub fn attached_sources(&self) -> Vec<String> {
        self.sources.borrow().clone()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count.get()
    }

    /// Pinned video quality index
    pub fn quality(&self) -> Option<usize> {
        self.quality.get()
    }
}

impl StreamingEngine for HeadlessStreamingEngine {
    fn update_settings(&self, settings: &Value) {
        merge(&mut self.settings.borrow_mut(), settings);
    }

    fn settings(&self) -> Value {
        self.settings.borrow().clone()
    }

    fn initialize(&self) {
        self.initialized.set(true);
    }

    fn attach_view(&self) {
        self.view_attached.set(true);
    }

    fn attach_source(&self, url: &str) {
        self.sources.borrow_mut().push(url.to_string());
    }

    fn set_auto_play(&self, enabled: bool) {
        self.auto_play.set(Some(enabled));
    }

    fn bitrate_info_list(&self, track: TrackKind) -> Vec<BitrateInfo> {
        match track {
            TrackKind::Video => self.ladder.clone(),
            TrackKind::Audio => Vec::new(),
        }
    }

    fn set_quality_for(&self, track: TrackKind, index: usize) {
        if track == TrackKind::Video && index < self.ladder.len() {
            self.quality.set(Some(index));
        }
    }

    fn quality_for(&self, track: TrackKind) -> Option<usize> {
        match track {
            TrackKind::Video => self.quality.get(),
            TrackKind::Audio => None,
        }
    }

    fn event_names(&self) -> Vec<String> {
        ENGINE_EVENTS.iter().map(|name| name.to_string()).collect()
    }

    fn on(&self, event: &str, handler: EngineHandler) -> SubscriptionId {
        let id = SubscriptionId(next(&self.next_id));
        self.handlers.borrow_mut().push((id, event.to_string(), handler));
        id
    }

    fn off(&self, event: &str, id: SubscriptionId) {
        self.handlers
            .borrow_mut()
            .retain(|(tracked, name, _)| !(*tracked == id && name == event));
    }

    fn reset(&self) {
        self.reset_count.set(self.reset_count.get() + 1);
        self.initialized.set(false);
        self.view_attached.set(false);
    }
}

/// Creates [`HeadlessStreamingEngine`]s and keeps every one it made
#[derive(Default)]
pub struct HeadlessEngineFactory {
    ladder: Vec<BitrateInfo>,
    engines: RefCell<Vec<Rc<HeadlessStreamingEngine>>>,
}

impl HeadlessEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Video ladder of `(bitrate, width, height)` rungs
    pub fn with_ladder(mut self, rungs: &[(u64, u32, u32)]) -> Self {
        self.ladder = rungs
            .iter()
            .enumerate()
            .map(|(quality_index, &(bitrate, width, height))| BitrateInfo {
                bitrate,
                width,
                height,
                scan_type: None,
                quality_index,
            })
            .collect();
        self
    }

    pub fn last(&self) -> Option<Rc<HeadlessStreamingEngine>> {
        self.engines.borrow().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.engines.borrow().len()
    }
}

impl StreamingEngineFactory for HeadlessEngineFactory {
    fn create(&self) -> Rc<dyn StreamingEngine> {
        let engine = Rc::new(HeadlessStreamingEngine::new(self.ladder.clone()));
        self.engines.borrow_mut().push(engine.clone());
        engine
    }
}

// ============================================================================
// Ad SDK
// ============================================================================

/// In-memory ad SDK
#[derive(Default)]
pub struct HeadlessAdSdk {
    vpaid_insecure: Cell<Option<bool>>,
    displays: RefCell<Vec<Rc<HeadlessDisplayContainer>>>,
    loaders: RefCell<Vec<Rc<HeadlessAdsLoader>>>,
}

impl HeadlessAdSdk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vpaid_insecure(&self) -> Option<bool> {
        self.vpaid_insecure.get()
    }

    pub fn display(&self) -> Option<Rc<HeadlessDisplayContainer>> {
        self.displays.borrow().last().cloned()
    }

    pub fn loader(&self) -> Option<Rc<HeadlessAdsLoader>> {
        self.loaders.borrow().last().cloned()
    }

    pub fn loaders_created(&self) -> usize {
        self.loaders.borrow().len()
    }
}

impl AdSdk for HeadlessAdSdk {
    fn set_vpaid_insecure(&self, insecure: bool) {
        self.vpaid_insecure.set(Some(insecure));
    }

    fn create_display_container(&self, overlay: &dyn OverlayContainer) -> Rc<dyn AdDisplayContainer> {
        let display = Rc::new(HeadlessDisplayContainer {
            overlay_id: overlay.id().to_string(),
            initialized: Cell::new(0),
            destroyed: Cell::new(false),
        });
        self.displays.borrow_mut().push(display.clone());
        display
    }

    fn create_loader(&self, _display: &Rc<dyn AdDisplayContainer>) -> Rc<dyn AdsLoader> {
        let loader = Rc::new(HeadlessAdsLoader::default());
        self.loaders.borrow_mut().push(loader.clone());
        loader
    }
}

pub struct HeadlessDisplayContainer {
    overlay_id: String,
    initialized: Cell<usize>,
    destroyed: Cell<bool>,
}

impl HeadlessDisplayContainer {
    pub fn overlay_id(&self) -> &str {
        &self.overlay_id
    }

    /// Times `initialize()` ran
    pub fn initialized(&self) -> usize {
        self.initialized.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

impl AdDisplayContainer for HeadlessDisplayContainer {
    fn initialize(&self) {
        self.initialized.set(self.initialized.get() + 1);
    }

    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

enum LoaderHandler {
    ManagerLoaded(ManagerLoadedHandler),
    Error(AdErrorHandler),
}

#[derive(Default)]
pub struct HeadlessAdsLoader {
    handlers: RefCell<Vec<(SubscriptionId, LoaderHandler)>>,
    next_id: Cell<u64>,
    requests: RefCell<Vec<AdsRequest>>,
    ios10_custom_playback_disabled: Cell<bool>,
    content_completed: Cell<usize>,
    destroyed: Cell<bool>,
}

impl HeadlessAdsLoader {
    /// Deliver `manager` to every "manager loaded" handler
    pub fn load_manager(&self, manager: &Rc<HeadlessAdsManager>) {
        let handlers: Vec<ManagerLoadedHandler> = self
            .handlers
            .borrow()
            .iter()
            .filter_map(|(_, handler)| match handler {
                LoaderHandler::ManagerLoaded(handler) => Some(handler.clone()),
                LoaderHandler::Error(_) => None,
            })
            .collect();
        for handler in handlers {
            handler(Rc::new(HeadlessManagerLoaded {
                manager: manager.clone(),
            }));
        }
    }

    /// Report a loader error (e.g. an empty VAST response)
    pub fn fail(&self, error: AdError) {
        let handlers: Vec<AdErrorHandler> = self
            .handlers
            .borrow()
            .iter()
            .filter_map(|(_, handler)| match handler {
                LoaderHandler::Error(handler) => Some(handler.clone()),
                LoaderHandler::ManagerLoaded(_) => None,
            })
            .collect();
        for handler in handlers {
            handler(&error);
        }
    }

    pub fn requests(&self) -> Vec<AdsRequest> {
        self.requests.borrow().clone()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn custom_playback_disabled(&self) -> bool {
        self.ios10_custom_playback_disabled.get()
    }

    /// Times content completion was signalled
    pub fn content_completed(&self) -> usize {
        self.content_completed.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn track(&self, handler: LoaderHandler) -> SubscriptionId {
        let id = SubscriptionId(next(&self.next_id));
        self.handlers.borrow_mut().push((id, handler));
        id
    }
}

impl AdsLoader for HeadlessAdsLoader {
    fn disable_custom_playback_for_ios10_plus(&self, disabled: bool) {
        self.ios10_custom_playback_disabled.set(disabled);
    }

    fn on_manager_loaded(&self, handler: ManagerLoadedHandler) -> SubscriptionId {
        self.track(LoaderHandler::ManagerLoaded(handler))
    }

    fn on_error(&self, handler: AdErrorHandler) -> SubscriptionId {
        self.track(LoaderHandler::Error(handler))
    }

    fn off(&self, id: SubscriptionId) {
        self.handlers.borrow_mut().retain(|(tracked, _)| *tracked != id);
    }

    fn request_ads(&self, request: &AdsRequest) {
        self.requests.borrow_mut().push(request.clone());
    }

    fn content_complete(&self) {
        self.content_completed.set(self.content_completed.get() + 1);
    }

    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

struct HeadlessManagerLoaded {
    manager: Rc<HeadlessAdsManager>,
}

impl AdsManagerLoaded for HeadlessManagerLoaded {
    fn ads_manager(&self, settings: &AdsRenderingSettings) -> Result<Rc<dyn AdsManager>, AdError> {
        self.manager.rendering.set(Some(*settings));
        match self.manager.creation_failure.borrow().clone() {
            Some(error) => Err(error),
            None => Ok(self.manager.clone()),
        }
    }
}

enum ManagerHandler {
    Event(AdEventType, AdEventHandler),
    Error(AdErrorHandler),
}

/// In-memory ads manager
#[derive(Default)]
pub struct HeadlessAdsManager {
    handlers: RefCell<Vec<(SubscriptionId, ManagerHandler)>>,
    next_id: Cell<u64>,
    creation_failure: RefCell<Option<AdError>>,
    init_failure: RefCell<Option<AdError>>,
    start_failure: RefCell<Option<AdError>>,
    init_report: RefCell<Option<AdError>>,
    start_report: RefCell<Option<AdError>>,
    rendering: Cell<Option<AdsRenderingSettings>>,
    init_size: Cell<Option<(u32, u32)>>,
    started: Cell<bool>,
    pause_count: Cell<usize>,
    resume_count: Cell<usize>,
    resizes: RefCell<Vec<(u32, u32)>>,
    remaining: Cell<Option<f64>>,
    destroyed: Cell<bool>,
}

impl HeadlessAdsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtaining the manager from the loaded event fails
    pub fn failing_creation(self, error: AdError) -> Self {
        *self.creation_failure.borrow_mut() = Some(error);
        self
    }

    pub fn failing_init(self, error: AdError) -> Self {
        *self.init_failure.borrow_mut() = Some(error);
        self
    }

    pub fn failing_start(self, error: AdError) -> Self {
        *self.start_failure.borrow_mut() = Some(error);
        self
    }

    /// `init` reports `error` to the error handlers, then returns `Ok`
    pub fn reporting_during_init(self, error: AdError) -> Self {
        *self.init_report.borrow_mut() = Some(error);
        self
    }

    /// `start` reports `error` to the error handlers, then returns `Ok`
    pub fn reporting_during_start(self, error: AdError) -> Self {
        *self.start_report.borrow_mut() = Some(error);
        self
    }

    /// Deliver a lifecycle event to the handlers registered for its kind
    pub fn emit(&self, event: AdEvent) {
        let handlers: Vec<AdEventHandler> = self
            .handlers
            .borrow()
            .iter()
            .filter_map(|(_, handler)| match handler {
                ManagerHandler::Event(kind, handler) if *kind == event.kind => Some(handler.clone()),
                _ => None,
            })
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    /// Report an ad error during playback
    pub fn fail(&self, error: AdError) {
        let handlers: Vec<AdErrorHandler> = self
            .handlers
            .borrow()
            .iter()
            .filter_map(|(_, handler)| match handler {
                ManagerHandler::Error(handler) => Some(handler.clone()),
                ManagerHandler::Event(..) => None,
            })
            .collect();
        for handler in handlers {
            handler(&error);
        }
    }

    pub fn set_remaining_time(&self, seconds: f64) {
        self.remaining.set(Some(seconds));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn rendering_settings(&self) -> Option<AdsRenderingSettings> {
        self.rendering.get()
    }

    pub fn init_size(&self) -> Option<(u32, u32)> {
        self.init_size.get()
    }

    pub fn is_started(&self) -> bool {
        self.started.get()
    }

    pub fn pause_count(&self) -> usize {
        self.pause_count.get()
    }

    pub fn resume_count(&self) -> usize {
        self.resume_count.get()
    }

    pub fn resizes(&self) -> Vec<(u32, u32)> {
        self.resizes.borrow().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn track(&self, handler: ManagerHandler) -> SubscriptionId {
        let id = SubscriptionId(next(&self.next_id));
        self.handlers.borrow_mut().push((id, handler));
        id
    }
}

impl AdsManager for HeadlessAdsManager {
    fn on(&self, kind: AdEventType, handler: AdEventHandler) -> SubscriptionId {
        self.track(ManagerHandler::Event(kind, handler))
    }

    fn on_error(&self, handler: AdErrorHandler) -> SubscriptionId {
        self.track(ManagerHandler::Error(handler))
    }

    fn off(&self, id: SubscriptionId) {
        self.handlers.borrow_mut().retain(|(tracked, _)| *tracked != id);
    }

    fn init(&self, width: u32, height: u32, _mode: ViewMode) -> Result<(), AdError> {
        if let Some(error) = self.init_failure.borrow().clone() {
            return Err(error);
        }
        self.init_size.set(Some((width, height)));
        let report = self.init_report.borrow_mut().take();
        if let Some(error) = report {
            self.fail(error);
        }
        Ok(())
    }

    fn start(&self) -> Result<(), AdError> {
        if let Some(error) = self.start_failure.borrow().clone() {
            return Err(error);
        }
        let report = self.start_report.borrow_mut().take();
        if let Some(error) = report {
            self.fail(error);
            return Ok(());
        }
        self.started.set(true);
        Ok(())
    }

    fn pause(&self) {
        self.pause_count.set(self.pause_count.get() + 1);
    }

    fn resume(&self) {
        self.resume_count.set(self.resume_count.get() + 1);
    }

    fn resize(&self, width: u32, height: u32, _mode: ViewMode) {
        self.resizes.borrow_mut().push((width, height));
    }

    fn remaining_time(&self) -> Option<f64> {
        self.remaining.get()
    }

    fn destroy(&self) {
        self.destroyed.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_events_are_queued_until_run() {
        let element = HeadlessElement::new();
        element.set_src("movie.mp4");
        element.load();
        element.play();
        assert!(element.dispatched().is_empty());

        element.run_pending();
        assert_eq!(element.dispatched_types(), ["loadedmetadata", "play", "playing"]);
        assert!(!element.paused());
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let element = HeadlessElement::new();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let id = element.add_listener("pause", Rc::new(move |_: &MediaEvent| counter.set(counter.get() + 1)));

        element.dispatch(MediaEvent::new(EventType::Pause));
        element.remove_listener(id);
        element.dispatch(MediaEvent::new(EventType::Pause));
        assert_eq!(calls.get(), 1);
        assert_eq!(element.listener_count(), 0);
    }

    #[test]
    fn test_settings_merge_deeply() {
        let engine = HeadlessStreamingEngine::new(Vec::new());
        engine.update_settings(&json!({ "streaming": { "abr": { "autoSwitchBitrate": { "video": false } } } }));
        let settings = engine.settings();
        assert_eq!(settings["streaming"]["abr"]["autoSwitchBitrate"]["video"], false);
        assert_eq!(settings["streaming"]["abr"]["autoSwitchBitrate"]["audio"], true);
    }

    #[test]
    fn test_interval_cleared() {
        let host = HeadlessHost::new();
        let ticks = Rc::new(Cell::new(0));
        let counter = ticks.clone();
        let id = host.set_interval(Duration::from_millis(300), Rc::new(move || counter.set(counter.get() + 1)));

        host.tick();
        host.clear_interval(id);
        host.tick();
        assert_eq!(ticks.get(), 1);
        assert_eq!(host.timer_count(), 0);
    }
}
