//! dash.js `MediaPlayer` as a `StreamingEngine`

use crate::{error_message, global_path, to_js};
use marquee_core::adapter::{BitrateInfo, EngineHandler, StreamingEngine, StreamingEngineFactory, TrackKind};
use marquee_core::event::BackendEvent;
use marquee_core::subscription::SubscriptionId;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlMediaElement;

mod sys {
    use wasm_bindgen::prelude::*;
    use web_sys::HtmlMediaElement;

    #[wasm_bindgen]
    extern "C" {
        pub type MediaPlayerFactory;

        #[wasm_bindgen(js_namespace = dashjs, js_name = MediaPlayer)]
        pub fn media_player() -> MediaPlayerFactory;

        #[wasm_bindgen(method)]
        pub fn create(this: &MediaPlayerFactory) -> MediaPlayer;

        pub type MediaPlayer;

        #[wasm_bindgen(method, js_name = updateSettings)]
        pub fn update_settings(this: &MediaPlayer, settings: &JsValue);

        #[wasm_bindgen(method, js_name = getSettings)]
        pub fn get_settings(this: &MediaPlayer) -> JsValue;

        #[wasm_bindgen(method)]
        pub fn initialize(this: &MediaPlayer);

        #[wasm_bindgen(method, js_name = attachView)]
        pub fn attach_view(this: &MediaPlayer, element: &HtmlMediaElement);

        #[wasm_bindgen(method, js_name = attachSource)]
        pub fn attach_source(this: &MediaPlayer, url: &str);

        #[wasm_bindgen(method, js_name = setAutoPlay)]
        pub fn set_auto_play(this: &MediaPlayer, enabled: bool);

        #[wasm_bindgen(method, js_name = getBitrateInfoListFor)]
        pub fn get_bitrate_info_list_for(this: &MediaPlayer, kind: &str) -> JsValue;

        #[wasm_bindgen(method, js_name = setQualityFor)]
        pub fn set_quality_for(this: &MediaPlayer, kind: &str, index: u32);

        #[wasm_bindgen(method, js_name = getQualityFor)]
        pub fn get_quality_for(this: &MediaPlayer, kind: &str) -> JsValue;

        #[wasm_bindgen(method)]
        pub fn on(this: &MediaPlayer, event: &str, handler: &js_sys::Function);

        #[wasm_bindgen(method)]
        pub fn off(this: &MediaPlayer, event: &str, handler: &js_sys::Function);

        #[wasm_bindgen(method)]
        pub fn reset(this: &MediaPlayer);
    }
}

type EngineCallback = Closure<dyn FnMut(JsValue)>;

/// One dash.js `MediaPlayer` bound to one media element
pub struct DashEngine {
    player: sys::MediaPlayer,
    element: HtmlMediaElement,
    handlers: RefCell<HashMap<SubscriptionId, (String, EngineCallback)>>,
    next_id: Cell<u64>,
}

impl DashEngine {
    fn new(player: sys::MediaPlayer, element: HtmlMediaElement) -> Self {
        Self {
            player,
            element,
            handlers: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }
}

/// Copy the primitive fields of an engine event, plus its error message.
///
/// dash.js events carry stream and request objects that may be cyclic, so
/// they are never serialized wholesale.
fn shallow_payload(raw: &JsValue) -> Value {
    let Some(object) = raw.dyn_ref::<js_sys::Object>() else {
        return raw.as_string().map(Value::from).unwrap_or(Value::Null);
    };

    let mut payload = Map::new();
    for entry in js_sys::Object::entries(object).iter() {
        let entry: js_sys::Array = entry.unchecked_into();
        let Some(key) = entry.get(0).as_string() else {
            continue;
        };
        let value = entry.get(1);
        let value = if let Some(text) = value.as_string() {
            Value::from(text)
        } else if let Some(flag) = value.as_bool() {
            Value::from(flag)
        } else if let Some(number) = value.as_f64() {
            serde_json::Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
        } else {
            continue;
        };
        payload.insert(key, value);
    }

    let nested = js_sys::Reflect::get(raw, &JsValue::from_str("error")).unwrap_or(JsValue::UNDEFINED);
    if !nested.is_undefined() && !nested.is_null() {
        if let Some(message) = error_message(&nested) {
            payload.insert("error".to_string(), serde_json::json!({ "message": message }));
        }
    }
    Value::Object(payload)
}

impl StreamingEngine for DashEngine {
    fn update_settings(&self, settings: &Value) {
        self.player.update_settings(&to_js(settings));
    }

    fn settings(&self) -> Value {
        serde_wasm_bindgen::from_value(self.player.get_settings()).unwrap_or(Value::Null)
    }

    fn initialize(&self) {
        self.player.initialize();
    }

    fn attach_view(&self) {
        self.player.attach_view(&self.element);
    }

    fn attach_source(&self, url: &str) {
        self.player.attach_source(url);
    }

    fn set_auto_play(&self, enabled: bool) {
        self.player.set_auto_play(enabled);
    }

    fn bitrate_info_list(&self, track: TrackKind) -> Vec<BitrateInfo> {
        serde_wasm_bindgen::from_value(self.player.get_bitrate_info_list_for(track.as_str())).unwrap_or_default()
    }

    fn set_quality_for(&self, track: TrackKind, index: usize) {
        self.player
            .set_quality_for(track.as_str(), u32::try_from(index).unwrap_or(u32::MAX));
    }

    fn quality_for(&self, track: TrackKind) -> Option<usize> {
        self.player
            .get_quality_for(track.as_str())
            .as_f64()
            .filter(|index| *index >= 0.0)
            .map(|index| index as usize)
    }

    fn event_names(&self) -> Vec<String> {
        let Some(events) = global_path(&["dashjs", "MediaPlayer", "events"]) else {
            return Vec::new();
        };
        let Some(events) = events.dyn_ref::<js_sys::Object>() else {
            return Vec::new();
        };

        let mut names: Vec<String> = js_sys::Object::values(events)
            .iter()
            .filter_map(|name| name.as_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn on(&self, event: &str, handler: EngineHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get() + 1);
        self.next_id.set(id.0);

        let name = event.to_string();
        let callback: EngineCallback = Closure::new(move |raw: JsValue| {
            handler(&BackendEvent::new(name.as_str()).with_payload(shallow_payload(&raw)));
        });
        self.player.on(event, callback.as_ref().unchecked_ref());
        self.handlers
            .borrow_mut()
            .insert(id, (event.to_string(), callback));
        id
    }

    fn off(&self, _event: &str, id: SubscriptionId) {
        let removed = self.handlers.borrow_mut().remove(&id);
        if let Some((name, callback)) = removed {
            self.player.off(&name, callback.as_ref().unchecked_ref());
        }
    }

    fn reset(&self) {
        self.player.reset();
    }
}

impl Drop for DashEngine {
    fn drop(&mut self) {
        for (_, (name, callback)) in self.handlers.borrow_mut().drain() {
            self.player.off(&name, callback.as_ref().unchecked_ref());
        }
    }
}

/// Creates dash.js players for one media element
pub struct DashEngineFactory {
    element: HtmlMediaElement,
}

impl DashEngineFactory {
    /// `Some` once `dashjs.MediaPlayer` is defined on the page
    pub fn probe(element: &HtmlMediaElement) -> Option<Self> {
        global_path(&["dashjs", "MediaPlayer"])
            .filter(JsValue::is_function)
            .map(|_| Self {
                element: element.clone(),
            })
    }
}

impl StreamingEngineFactory for DashEngineFactory {
    fn create(&self) -> Rc<dyn StreamingEngine> {
        Rc::new(DashEngine::new(sys::media_player().create(), self.element.clone()))
    }
}
