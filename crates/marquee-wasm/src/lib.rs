//! Marquee WASM - browser bindings for the Marquee player
//!
//! Implements the host traits of `marquee-core` over `web-sys`:
//! - `HTMLMediaElement` as the shared media element
//! - `window` timers, resize events and capability sniffing
//! - dash.js `MediaPlayer` as the streaming engine
//! - Google IMA as the ad SDK
//!
//! ## Usage
//!
//! ```javascript
//! import init, { MarqueePlayer } from '@marquee/wasm';
//!
//! await init();
//! const player = await MarqueePlayer.create(video, 'https://cdn.example/movie.mpd', {
//!     ads: { tag_url: 'https://ads.example/vast.xml' },
//! });
//! video.addEventListener('playererror', (e) => console.error(e.detail.message));
//! player.load();
//! ```

use wasm_bindgen::prelude::*;

mod dash;
mod element;
mod host;
mod ima;
mod player;
mod script;

pub use dash::{DashEngine, DashEngineFactory};
pub use element::{DomElement, DomOverlay};
pub use host::BrowserHost;
pub use ima::ImaSdk;
pub use player::MarqueePlayer;
pub use script::DomScriptLoader;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();
    marquee_core::init();
    web_sys::console::log_1(&"[Marquee WASM] Initialized".into());
}

/// Library version
#[wasm_bindgen]
pub fn version() -> String {
    marquee_core::VERSION.to_string()
}

pub(crate) fn js_error(message: impl Into<String>) -> JsValue {
    js_sys::Error::new(&message.into()).into()
}

/// Serialize with plain objects instead of `Map`s
pub(crate) fn to_js<T: serde::Serialize + ?Sized>(value: &T) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::NULL)
}

/// Walk a dotted path from `globalThis`; `None` when any step is missing
pub(crate) fn global_path(path: &[&str]) -> Option<JsValue> {
    let mut value: JsValue = js_sys::global().into();
    for key in path {
        value = js_sys::Reflect::get(&value, &JsValue::from_str(key)).ok()?;
        if value.is_undefined() || value.is_null() {
            return None;
        }
    }
    Some(value)
}

/// `message` of an error-like JS value (`Error`, `{ error: { message } }`, a string)
pub(crate) fn error_message(value: &JsValue) -> Option<String> {
    if let Some(message) = value.as_string() {
        return Some(message);
    }
    let message = js_sys::Reflect::get(value, &JsValue::from_str("message")).ok();
    if let Some(message) = message.and_then(|message| message.as_string()) {
        return Some(message);
    }
    let nested = js_sys::Reflect::get(value, &JsValue::from_str("error")).ok()?;
    if nested.is_undefined() || nested.is_null() {
        return None;
    }
    error_message(&nested)
}
