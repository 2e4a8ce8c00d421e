//! `HostEnv` over the browser `window`

use crate::js_error;
use marquee_core::host::{Capabilities, HostEnv, ListenerId, TimerId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::warn;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::Window;

type Callback = Closure<dyn FnMut()>;

pub struct BrowserHost {
    window: Window,
    capabilities: Capabilities,
    timers: RefCell<HashMap<TimerId, (i32, Callback)>>,
    resize: RefCell<HashMap<ListenerId, Callback>>,
    next_id: Cell<u64>,
}

impl BrowserHost {
    pub fn new() -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| js_error("no global window"))?;
        let navigator = window.navigator();
        let agent = navigator.user_agent().unwrap_or_default();
        let vendor = navigator.vendor();
        let media_source = js_sys::Reflect::has(&window, &JsValue::from_str("MediaSource")).unwrap_or(false);

        Ok(Self {
            capabilities: sniff(&agent, &vendor, media_source),
            window,
            timers: RefCell::new(HashMap::new()),
            resize: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        })
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

/// Capability flags from the user agent and vendor strings
pub(crate) fn sniff(agent: &str, vendor: &str, media_source: bool) -> Capabilities {
    let is_ios = ["iPad", "iPhone", "iPod"].iter().any(|device| agent.contains(device));
    Capabilities {
        media_source_extensions: media_source,
        is_ios,
        is_android: agent.contains("Android"),
        is_safari: agent.contains("Safari") && vendor.contains("Apple Computer"),
        is_chrome: (agent.contains("Chrome") && vendor.contains("Google Inc")) || agent.contains("CriOS"),
    }
}

impl HostEnv for BrowserHost {
    fn set_interval(&self, period: Duration, tick: Rc<dyn Fn()>) -> TimerId {
        let id = TimerId(self.next_id());
        let callback: Callback = Closure::new(move || tick());
        let millis = i32::try_from(period.as_millis()).unwrap_or(i32::MAX);

        match self
            .window
            .set_interval_with_callback_and_timeout_and_arguments_0(callback.as_ref().unchecked_ref(), millis)
        {
            Ok(handle) => {
                self.timers.borrow_mut().insert(id, (handle, callback));
            }
            Err(err) => warn!(?err, "setInterval failed"),
        }
        id
    }

    fn clear_interval(&self, id: TimerId) {
        let timer = self.timers.borrow_mut().remove(&id);
        if let Some((handle, _callback)) = timer {
            self.window.clear_interval_with_handle(handle);
        }
    }

    fn on_resize(&self, listener: Rc<dyn Fn()>) -> ListenerId {
        let id = ListenerId(self.next_id());
        let callback: Callback = Closure::new(move || listener());

        match self
            .window
            .add_event_listener_with_callback("resize", callback.as_ref().unchecked_ref())
        {
            Ok(()) => {
                self.resize.borrow_mut().insert(id, callback);
            }
            Err(err) => warn!(?err, "Could not listen for resize"),
        }
        id
    }

    fn off_resize(&self, id: ListenerId) {
        let removed = self.resize.borrow_mut().remove(&id);
        if let Some(callback) = removed {
            let _ = self
                .window
                .remove_event_listener_with_callback("resize", callback.as_ref().unchecked_ref());
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl Drop for BrowserHost {
    fn drop(&mut self) {
        for (_, (handle, _callback)) in self.timers.borrow_mut().drain() {
            self.window.clear_interval_with_handle(handle);
        }
        for (_, callback) in self.resize.borrow_mut().drain() {
            let _ = self
                .window
                .remove_event_listener_with_callback("resize", callback.as_ref().unchecked_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_SAFARI: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const ANDROID_CHROME: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

    #[test]
    fn test_sniff_iphone_safari() {
        let caps = sniff(IPHONE_SAFARI, "Apple Computer, Inc.", false);
        assert!(caps.is_ios);
        assert!(caps.is_safari);
        assert!(!caps.is_chrome);
        assert!(caps.ad_play_muted());
    }

    #[test]
    fn test_sniff_android_chrome() {
        let caps = sniff(ANDROID_CHROME, "Google Inc.", true);
        assert!(caps.is_android);
        assert!(caps.is_chrome);
        assert!(!caps.is_safari);
        assert!(caps.media_source_extensions);
        assert!(!caps.ad_autoplay_allowed());
    }
}
