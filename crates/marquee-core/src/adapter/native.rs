//! Native HTML5 media adapter

use super::{AdapterFactory, MediaAdapter};
use crate::event::{BackendEvent, BackendFamily, MediaEvent};
use crate::host::{ListenerId, MediaElement};
use crate::normalizer::EventNormalizer;
use crate::source::{LevelId, QualityLevel, Source};
use crate::subscription::Subscriptions;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, instrument};

/// Plays sources the element decodes itself.
///
/// Native media events already fire on the element under canonical names, so
/// the only subscription is the `error` event, which is normalized to
/// `playererror`.
pub struct NativeAdapter {
    element: Rc<dyn MediaElement>,
    source: RefCell<Source>,
    normalizer: Rc<EventNormalizer>,
    subscriptions: RefCell<Subscriptions<ListenerId>>,
    loaded: Cell<bool>,
}

impl NativeAdapter {
    pub fn new(element: Rc<dyn MediaElement>, source: Source) -> Self {
        let normalizer = Rc::new(EventNormalizer::new(element.clone(), BackendFamily::Native));
        Self {
            element,
            source: RefCell::new(source),
            normalizer,
            subscriptions: RefCell::new(Subscriptions::new()),
            loaded: Cell::new(false),
        }
    }

    /// Predicate shared with [`NativeFactory`]
    pub fn supports(element: &dyn MediaElement, mime: &str) -> bool {
        element.can_play_type(mime).is_playable()
    }

    fn subscribe(&self) {
        let element = Rc::downgrade(&self.element);
        let normalizer = Rc::downgrade(&self.normalizer);
        let id = self.element.add_listener(
            "error",
            Rc::new(move |_: &MediaEvent| {
                let (Some(element), Some(normalizer)) = (element.upgrade(), normalizer.upgrade()) else {
                    return;
                };
                let message = element
                    .error_message()
                    .unwrap_or_else(|| "media element error".to_string());
                normalizer.forward(&BackendEvent::new("error").with_payload(json!({ "message": message })));
            }),
        );
        self.subscriptions.borrow_mut().track("error", id);
    }
}

impl MediaAdapter for NativeAdapter {
    fn family(&self) -> BackendFamily {
        BackendFamily::Native
    }

    fn can_play_type(&self, mime: &str) -> bool {
        Self::supports(self.element.as_ref(), mime)
    }

    #[instrument(skip(self))]
    fn load(&self) {
        if self.loaded.replace(true) {
            return;
        }
        let src = self.source.borrow().src.clone();
        info!(src = %src, "Loading native source");

        self.subscribe();
        self.element.set_src(&src);
        self.element.load();
    }

    fn source(&self) -> Source {
        self.source.borrow().clone()
    }

    fn set_source(&self, source: Source) -> bool {
        if !self.can_play_type(&source.mime) {
            return false;
        }
        debug!(src = %source.src, "Replacing native source in place");
        let src = source.src.clone();
        *self.source.borrow_mut() = source;

        if self.loaded.get() {
            self.element.set_src(&src);
            self.element.load();
        }
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
        Vec::new()
    }

    fn level(&self) -> LevelId {
        LevelId::Auto
    }

    fn set_level(&self, level: LevelId) {
        debug!(%level, "Native playback has a single level");
    }

    fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    fn destroy(&self) {
        let released = self.subscriptions.borrow_mut().drain();
        for (_, id) in released {
            self.element.remove_listener(id);
        }
        self.loaded.set(false);
    }
}

/// Factory for [`NativeAdapter`]
#[derive(Default)]
pub struct NativeFactory;

impl NativeFactory {
    pub fn new() -> Self {
        Self
    }
}

impl AdapterFactory for NativeFactory {
    fn family(&self) -> BackendFamily {
        BackendFamily::Native
    }

    fn can_play_type(&self, element: &dyn MediaElement, mime: &str) -> bool {
        NativeAdapter::supports(element, mime)
    }

    fn create(&self, element: Rc<dyn MediaElement>, source: Source) -> Rc<dyn MediaAdapter> {
        Rc::new(NativeAdapter::new(element, source))
    }
}
