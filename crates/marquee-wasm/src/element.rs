//! `MediaElement` over a DOM `HTMLMediaElement`

use crate::to_js;
use marquee_core::event::{EventDetail, EventType, MediaEvent};
use marquee_core::host::{CanPlay, Listener, ListenerId, MediaElement, OverlayContainer, Size};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{CustomEvent, CustomEventInit, Element, Event, HtmlMediaElement};

type DomCallback = Closure<dyn FnMut(Event)>;

/// The page's `<video>`/`<audio>` node.
///
/// Canonical events are dispatched as `CustomEvent`s so page scripts can
/// listen with plain `addEventListener` and read `event.detail`.
pub struct DomElement {
    node: HtmlMediaElement,
    listeners: RefCell<HashMap<ListenerId, (String, DomCallback)>>,
    next_id: Cell<u64>,
}

impl DomElement {
    pub fn new(node: HtmlMediaElement) -> Self {
        Self {
            node,
            listeners: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    pub fn node(&self) -> &HtmlMediaElement {
        &self.node
    }

    fn insert_overlay(&self, id: &str) -> Result<Element, JsValue> {
        let document = self
            .node
            .owner_document()
            .ok_or_else(|| JsValue::from_str("media element is not attached to a document"))?;
        let overlay = document.create_element("div")?;
        overlay.set_id(id);
        overlay.set_class_name(id);
        if let Some(parent) = self.node.parent_node() {
            parent.insert_before(&overlay, self.node.next_sibling().as_ref())?;
        }
        Ok(overlay)
    }
}

fn media_event(event: &Event) -> MediaEvent {
    let detail = event
        .dyn_ref::<CustomEvent>()
        .map(CustomEvent::detail)
        .filter(|detail| !detail.is_undefined() && !detail.is_null())
        .and_then(|detail| serde_wasm_bindgen::from_value::<EventDetail>(detail).ok());

    MediaEvent {
        event_type: EventType::from(event.type_()),
        detail,
    }
}

fn to_size(width: i32, height: i32) -> Size {
    Size::new(width.max(0) as u32, height.max(0) as u32)
}

impl MediaElement for DomElement {
    fn add_listener(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.get() + 1);
        self.next_id.set(id.0);

        let callback: DomCallback = Closure::new(move |event: Event| listener(&media_event(&event)));
        if let Err(err) = self
            .node
            .add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())
        {
            warn!(?err, event, "addEventListener failed");
        }
        self.listeners.borrow_mut().insert(id, (event.to_string(), callback));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        let removed = self.listeners.borrow_mut().remove(&id);
        if let Some((event, callback)) = removed {
            let _ = self
                .node
                .remove_event_listener_with_callback(&event, callback.as_ref().unchecked_ref());
        }
    }

    fn dispatch(&self, event: MediaEvent) {
        let init = CustomEventInit::new();
        init.set_detail(&to_js(&event.detail));

        match CustomEvent::new_with_event_init_dict(event.type_name(), &init) {
            Ok(custom) => {
                if let Err(err) = self.node.dispatch_event(&custom) {
                    warn!(?err, event = event.type_name(), "dispatchEvent failed");
                }
            }
            Err(err) => warn!(?err, event = event.type_name(), "Could not create CustomEvent"),
        }
    }

    fn src(&self) -> String {
        self.node.src()
    }

    fn set_src(&self, src: &str) {
        self.node.set_src(src);
    }

    fn load(&self) {
        self.node.load();
    }

    fn play(&self) {
        match self.node.play() {
            Ok(promise) => spawn_local(async move {
                if let Err(err) = JsFuture::from(promise).await {
                    warn!(?err, "play() was rejected");
                }
            }),
            Err(err) => warn!(?err, "play() failed"),
        }
    }

    fn pause(&self) {
        if let Err(err) = self.node.pause() {
            warn!(?err, "pause() failed");
        }
    }

    fn paused(&self) -> bool {
        self.node.paused()
    }

    fn ended(&self) -> bool {
        self.node.ended()
    }

    fn volume(&self) -> f64 {
        self.node.volume()
    }

    fn set_volume(&self, volume: f64) {
        self.node.set_volume(volume);
    }

    fn muted(&self) -> bool {
        self.node.muted()
    }

    fn set_muted(&self, muted: bool) {
        self.node.set_muted(muted);
    }

    fn can_play_type(&self, mime: &str) -> CanPlay {
        CanPlay::from_dom(&self.node.can_play_type(mime))
    }

    fn error_message(&self) -> Option<String> {
        self.node.error().map(|error| {
            let message = error.message();
            if message.is_empty() {
                format!("MediaError code {}", error.code())
            } else {
                message
            }
        })
    }

    fn size(&self) -> Size {
        to_size(self.node.client_width(), self.node.client_height())
    }

    fn container_size(&self) -> Size {
        self.node
            .parent_element()
            .map(|parent| to_size(parent.client_width(), parent.client_height()))
            .unwrap_or_else(|| self.size())
    }

    fn set_class(&self, class: &str, enabled: bool) {
        if let Err(err) = self.node.class_list().toggle_with_force(class, enabled) {
            warn!(?err, class, "classList.toggle failed");
        }
    }

    fn create_overlay(&self, id: &str) -> Box<dyn OverlayContainer> {
        let node = match self.insert_overlay(id) {
            Ok(node) => Some(node),
            Err(err) => {
                warn!(?err, id, "Could not insert overlay");
                None
            }
        };
        Box::new(DomOverlay {
            id: id.to_string(),
            node,
        })
    }
}

impl Drop for DomElement {
    fn drop(&mut self) {
        for (_, (event, callback)) in self.listeners.borrow_mut().drain() {
            let _ = self
                .node
                .remove_event_listener_with_callback(&event, callback.as_ref().unchecked_ref());
        }
    }
}

/// Overlay `<div>` inserted right after the media element
pub struct DomOverlay {
    id: String,
    node: Option<Element>,
}

impl DomOverlay {
    pub fn node(&self) -> Option<&Element> {
        self.node.as_ref()
    }
}

impl OverlayContainer for DomOverlay {
    fn id(&self) -> &str {
        &self.id
    }

    fn remove(&self) {
        if let Some(node) = &self.node {
            node.remove();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
