//! MPEG-DASH adapter over a streaming engine

use super::engine::{EngineHandler, StreamingEngine, StreamingEngineFactory, TrackKind};
use super::{AdapterFactory, MediaAdapter};
use crate::config::StreamingConfig;
use crate::event::{BackendEvent, BackendFamily, EventType};
use crate::host::{Capabilities, MediaElement};
use crate::normalizer::EventNormalizer;
use crate::signal::{completion, Completer, Completion};
use crate::source::{LevelId, QualityLevel, Source, MIME_DASH};
use crate::subscription::{SubscriptionId, Subscriptions};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, instrument};

/// Engine event signalling the stream can report duration and levels
pub const STREAM_ACTIVATED: &str = "streamActivated";

/// Plays `application/dash+xml` sources through an MSE streaming engine.
///
/// Supports in-place source replacement: the old engine's subscriptions are
/// removed and the engine reset before a fresh engine is created, so no
/// dangling handler can deliver events twice.
pub struct DashAdapter {
    element: Rc<dyn MediaElement>,
    factory: Rc<dyn StreamingEngineFactory>,
    engine: RefCell<Rc<dyn StreamingEngine>>,
    source: RefCell<Source>,
    /// Rendered `updateSettings` payload, caller overrides included
    settings: Value,
    capabilities: Capabilities,
    normalizer: Rc<EventNormalizer>,
    subscriptions: RefCell<Subscriptions<SubscriptionId>>,
    ready: RefCell<Completion>,
    completer: RefCell<Option<Completer>>,
    loaded: Cell<bool>,
}

impl DashAdapter {
    pub fn new(
        element: Rc<dyn MediaElement>,
        factory: Rc<dyn StreamingEngineFactory>,
        source: Source,
        config: &StreamingConfig,
        capabilities: Capabilities,
    ) -> Self {
        let normalizer = EventNormalizer::new(element.clone(), BackendFamily::Dash)
            .with_alias(STREAM_ACTIVATED, EventType::LoadedMetadata);
        let (completer, ready) = completion();

        Self {
            engine: RefCell::new(factory.create()),
            element,
            factory,
            source: RefCell::new(source),
            settings: config.settings(),
            capabilities,
            normalizer: Rc::new(normalizer),
            subscriptions: RefCell::new(Subscriptions::new()),
            ready: RefCell::new(ready),
            completer: RefCell::new(Some(completer)),
            loaded: Cell::new(false),
        }
    }

    /// Predicate shared with [`DashFactory`]: MSE is required
    pub fn supports(capabilities: &Capabilities, mime: &str) -> bool {
        capabilities.media_source_extensions && mime.eq_ignore_ascii_case(MIME_DASH)
    }

    fn engine(&self) -> Rc<dyn StreamingEngine> {
        self.engine.borrow().clone()
    }

    fn prepare(&self, engine: &Rc<dyn StreamingEngine>) {
        engine.update_settings(&self.settings);
        engine.initialize();
        engine.attach_view();
        engine.set_auto_play(false);
    }

    fn bind(&self, engine: &Rc<dyn StreamingEngine>) {
        let completer = self.completer.borrow_mut().take();
        let normalizer = Rc::downgrade(&self.normalizer);

        let handler: EngineHandler = Rc::new(move |event: &BackendEvent| {
            if let Some(normalizer) = normalizer.upgrade() {
                normalizer.forward(event);
            }
            if let Some(completer) = &completer {
                if event.name == STREAM_ACTIVATED {
                    completer.complete();
                } else if event.is_error() {
                    completer.fail_engine(BackendFamily::Dash, event.message());
                }
            }
        });

        let mut names = engine.event_names();
        if !names.iter().any(|name| name == STREAM_ACTIVATED) {
            names.push(STREAM_ACTIVATED.to_string());
        }

        let registered: Vec<_> = names
            .into_iter()
            .map(|name| {
                let id = engine.on(&name, handler.clone());
                (name, id)
            })
            .collect();

        let mut subscriptions = self.subscriptions.borrow_mut();
        for (name, id) in registered {
            subscriptions.track(name, id);
        }
        debug!(count = subscriptions.len(), "Engine events subscribed");
    }

    /// Unsubscribe everything, then reset the engine
    fn release(&self) {
        let engine = self.engine();
        let released = self.subscriptions.borrow_mut().drain();
        for (name, id) in released {
            engine.off(&name, id);
        }
        engine.reset();
    }

    fn rearm(&self) {
        let (completer, ready) = completion();
        *self.completer.borrow_mut() = Some(completer);
        *self.ready.borrow_mut() = ready;
    }

    fn auto_switch_enabled(&self) -> bool {
        self.engine()
            .settings()
            .pointer("/streaming/abr/autoSwitchBitrate/video")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

impl MediaAdapter for DashAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Dash
    }

    fn can_play_type(&self, mime: &str) -> bool {
        Self::supports(&self.capabilities, mime)
    }

    #[instrument(skip(self))]
    fn load(&self) {
        if self.loaded.replace(true) {
            return;
        }
        let engine = self.engine();
        let src = self.source.borrow().src.clone();
        info!(src = %src, "Loading DASH source");

        self.bind(&engine);
        self.prepare(&engine);
        engine.attach_source(&src);
    }

    fn source(&self) -> Source {
        self.source.borrow().clone()
    }

    #[instrument(skip(self, source), fields(src = %source.src))]
    fn set_source(&self, source: Source) -> bool {
        if !self.can_play_type(&source.mime) {
            return false;
        }
        let src = source.src.clone();
        *self.source.borrow_mut() = source;

        if !self.loaded.get() {
            return true;
        }

        info!("Replacing DASH engine");
        self.release();
        let engine = self.factory.create();
        *self.engine.borrow_mut() = engine.clone();
        self.rearm();
        self.bind(&engine);
        self.prepare(&engine);
        engine.attach_source(&src);
        true
    }

    fn play(&self) {
        self.element.play();
    }

    fn pause(&self) {
        self.element.pause();
    }

    fn paused(&self) -> bool {
        self.element.paused()
    }

    fn ended(&self) -> bool {
        self.element.ended()
    }

    fn volume(&self) -> f64 {
        self.element.volume()
    }

    fn set_volume(&self, volume: f64) {
        self.element.set_volume(volume.clamp(0.0, 1.0));
    }

    fn muted(&self) -> bool {
        self.element.muted()
    }

    fn set_muted(&self, muted: bool) {
        self.element.set_muted(muted);
    }

    fn levels(&self) -> Vec<QualityLevel> {
        self.engine()
            .bitrate_info_list(TrackKind::Video)
            .iter()
            .enumerate()
            .map(|(index, info)| QualityLevel {
                id: LevelId::Index(index),
                label: info.label(),
                height: info.height,
            })
            .collect()
    }

    fn level(&self) -> LevelId {
        if self.auto_switch_enabled() {
            return LevelId::Auto;
        }
        self.engine()
            .quality_for(TrackKind::Video)
            .map(LevelId::Index)
            .unwrap_or(LevelId::Auto)
    }

    fn set_level(&self, level: LevelId) {
        let engine = self.engine();
        debug!(%level, "Setting DASH level");
        match level {
            LevelId::Auto => {
                engine.update_settings(&json!({ "streaming": { "abr": { "autoSwitchBitrate": { "video": true } } } }));
            }
            LevelId::Index(index) => {
                engine.update_settings(&json!({ "streaming": { "abr": { "autoSwitchBitrate": { "video": false } } } }));
                engine.set_quality_for(TrackKind::Video, index);
            }
        }
    }

    fn ready(&self) -> Completion {
        self.ready.borrow().clone()
    }

    fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    fn destroy(&self) {
        self.release();
        self.loaded.set(false);
    }
}

/// Factory for [`DashAdapter`]
pub struct DashFactory {
    engines: Rc<dyn StreamingEngineFactory>,
    config: StreamingConfig,
    capabilities: Capabilities,
}

impl DashFactory {
    pub fn new(engines: Rc<dyn StreamingEngineFactory>, config: StreamingConfig, capabilities: Capabilities) -> Self {
        Self {
            engines,
            config,
            capabilities,
        }
    }
}

impl AdapterFactory for DashFactory {
    fn family(&self) -> BackendFamily {
        BackendFamily::Dash
    }

    fn can_play_type(&self, _element: &dyn MediaElement, mime: &str) -> bool {
        DashAdapter::supports(&self.capabilities, mime)
    }

    fn create(&self, element: Rc<dyn MediaElement>, source: Source) -> Rc<dyn MediaAdapter> {
        Rc::new(DashAdapter::new(
            element,
            self.engines.clone(),
            source,
            &self.config,
            self.capabilities,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDetail;
    use crate::headless::{HeadlessElement, HeadlessEngineFactory};

    fn mse() -> Capabilities {
        Capabilities {
            media_source_extensions: true,
            ..Default::default()
        }
    }

    fn dash(element: &Rc<HeadlessElement>, engines: &Rc<HeadlessEngineFactory>) -> DashAdapter {
        DashAdapter::new(
            element.clone(),
            engines.clone(),
            Source::new("https://cdn.example/vod/manifest.mpd", MIME_DASH),
            &StreamingConfig::default(),
            mse(),
        )
    }

    #[test]
    fn test_can_play_requires_mse() {
        assert!(DashAdapter::supports(&mse(), MIME_DASH));
        assert!(!DashAdapter::supports(&mse(), "video/mp4"));
        assert!(!DashAdapter::supports(&Capabilities::default(), MIME_DASH));
    }

    #[test]
    fn test_load_prepares_engine_without_autoplay() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let adapter = dash(&element, &engines);

        adapter.load();
        adapter.load();

        let engine = engines.last().unwrap();
        assert!(engine.is_initialized());
        assert!(engine.is_view_attached());
        assert_eq!(engine.auto_play(), Some(false));
        assert_eq!(engine.attached_sources(), ["https://cdn.example/vod/manifest.mpd"]);
        assert_eq!(engine.settings()["streaming"]["buffer"]["fastSwitchEnabled"], true);
        assert_eq!(adapter.subscription_count(), engine.handler_count());
    }

    #[test]
    fn test_loadedmetadata_waits_for_stream_activation() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let adapter = dash(&element, &engines);
        adapter.load();

        assert!(element.dispatched_types().is_empty());
        assert!(!adapter.ready().is_settled());

        engines.last().unwrap().emit(BackendEvent::new(STREAM_ACTIVATED));
        assert_eq!(element.dispatched_types(), ["loadedmetadata"]);
        assert!(adapter.ready().is_settled());
    }

    #[test]
    fn test_engine_errors_normalized() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let adapter = dash(&element, &engines);
        adapter.load();

        engines
            .last()
            .unwrap()
            .emit(BackendEvent::new("error").with_payload(json!({ "error": { "message": "download error" } })));

        let dispatched = element.dispatched();
        assert_eq!(dispatched[0].type_name(), "playererror");
        assert_eq!(
            dispatched[0].detail,
            Some(EventDetail::Error {
                message: "download error".into(),
                family: BackendFamily::Dash,
            })
        );
    }

    #[tokio::test]
    async fn test_error_before_activation_rejects_ready() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let adapter = dash(&element, &engines);
        adapter.load();

        let engine = engines.last().unwrap();
        engine.emit(BackendEvent::new("error").with_payload(json!({ "error": { "message": "manifest 404" } })));
        engine.emit(BackendEvent::new(STREAM_ACTIVATED));

        let err = adapter.ready().wait().await.unwrap_err();
        assert_eq!(err.error_code(), "ENGINE");
        assert!(err.to_string().contains("manifest 404"));
    }

    #[tokio::test]
    async fn test_error_after_activation_keeps_ready_resolved() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let adapter = dash(&element, &engines);
        adapter.load();

        let engine = engines.last().unwrap();
        engine.emit(BackendEvent::new(STREAM_ACTIVATED));
        engine.emit(BackendEvent::new("error").with_payload(json!({ "error": { "message": "segment 404" } })));

        assert!(adapter.ready().wait().await.is_ok());
    }

    #[test]
    fn test_source_replacement_does_not_double_deliver() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let adapter = dash(&element, &engines);
        adapter.load();
        let first = engines.last().unwrap();

        assert!(adapter.set_source(Source::new("https://cdn.example/live/manifest.mpd", MIME_DASH)));
        let second = engines.last().unwrap();

        assert_eq!(engines.created(), 2);
        assert_eq!(first.handler_count(), 0);
        assert_eq!(first.reset_count(), 1);

        first.emit(BackendEvent::new("playbackProgress"));
        second.emit(BackendEvent::new("playbackProgress"));
        assert_eq!(element.dispatched_types(), ["playbackProgress"]);
        assert_eq!(adapter.subscription_count(), second.handler_count());
    }

    #[test]
    fn test_non_dash_source_refused() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let adapter = dash(&element, &engines);
        assert!(!adapter.set_source(Source::new("a.mp4", "video/mp4")));
        assert!(adapter.source().is_dash());
    }

    #[test]
    fn test_levels_and_auto_sentinel() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new().with_ladder(&[(800_000, 640, 360), (2_400_000, 1280, 720)]));
        let adapter = dash(&element, &engines);
        adapter.load();

        let levels = adapter.levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[1].id, LevelId::Index(1));
        assert_eq!(levels[1].label, "720p");
        assert_eq!(adapter.level(), LevelId::Auto);

        adapter.set_level(LevelId::Index(1));
        assert_eq!(adapter.level(), LevelId::Index(1));
        assert_eq!(engines.last().unwrap().quality(), Some(1));

        adapter.set_level(LevelId::Auto);
        assert_eq!(adapter.level(), LevelId::Auto);
        assert!(!adapter.levels().is_empty());
    }

    #[test]
    fn test_destroy_before_load_is_safe() {
        let element = Rc::new(HeadlessElement::new());
        let engines = Rc::new(HeadlessEngineFactory::new());
        let adapter = dash(&element, &engines);

        adapter.destroy();
        adapter.destroy();
        assert_eq!(adapter.subscription_count(), 0);
    }
}
