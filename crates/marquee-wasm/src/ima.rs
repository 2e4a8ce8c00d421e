//! Google IMA SDK as the `AdSdk` capability

use crate::element::DomOverlay;
use crate::{error_message, global_path};
use marquee_core::ads::{
    AdDisplayContainer, AdError, AdErrorHandler, AdEvent, AdEventHandler, AdEventType, AdInfo, AdSdk, AdsLoader,
    AdsManager, AdsManagerLoaded, AdsRenderingSettings, AdsRequest, ManagerLoadedHandler, ViewMode,
};
use marquee_core::host::OverlayContainer;
use marquee_core::subscription::SubscriptionId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlMediaElement};

mod sys {
    use wasm_bindgen::prelude::*;
    use web_sys::{Element, HtmlMediaElement};

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_namespace = ["google", "ima", "settings"], js_name = setVpaidMode)]
        pub fn set_vpaid_mode(mode: u32);

        #[wasm_bindgen(js_namespace = ["google", "ima"])]
        #[derive(Clone)]
        pub type AdDisplayContainer;

        #[wasm_bindgen(constructor, js_namespace = ["google", "ima"])]
        pub fn new(container: &Element, video: &HtmlMediaElement) -> AdDisplayContainer;

        #[wasm_bindgen(method)]
        pub fn initialize(this: &AdDisplayContainer);

        #[wasm_bindgen(method)]
        pub fn destroy(this: &AdDisplayContainer);

        #[wasm_bindgen(js_namespace = ["google", "ima"])]
        pub type AdsLoader;

        #[wasm_bindgen(constructor, js_namespace = ["google", "ima"])]
        pub fn new(display: &AdDisplayContainer) -> AdsLoader;

        #[wasm_bindgen(method, js_name = getSettings)]
        pub fn get_settings(this: &AdsLoader) -> ImaSdkSettings;

        #[wasm_bindgen(method, js_name = addEventListener)]
        pub fn add_event_listener(this: &AdsLoader, kind: &str, handler: &js_sys::Function, capture: bool);

        #[wasm_bindgen(method, js_name = removeEventListener)]
        pub fn remove_event_listener(this: &AdsLoader, kind: &str, handler: &js_sys::Function, capture: bool);

        #[wasm_bindgen(method, js_name = requestAds)]
        pub fn request_ads(this: &AdsLoader, request: &AdsRequest);

        #[wasm_bindgen(method, js_name = contentComplete)]
        pub fn content_complete(this: &AdsLoader);

        #[wasm_bindgen(method)]
        pub fn destroy(this: &AdsLoader);

        pub type ImaSdkSettings;

        #[wasm_bindgen(method, js_name = setDisableCustomPlaybackForIOS10Plus)]
        pub fn set_disable_custom_playback_for_ios10_plus(this: &ImaSdkSettings, disabled: bool);

        #[wasm_bindgen(js_namespace = ["google", "ima"])]
        pub type AdsRequest;

        #[wasm_bindgen(constructor, js_namespace = ["google", "ima"])]
        pub fn new() -> AdsRequest;

        #[wasm_bindgen(method, setter = adTagUrl)]
        pub fn set_ad_tag_url(this: &AdsRequest, url: &str);

        #[wasm_bindgen(method, setter = linearAdSlotWidth)]
        pub fn set_linear_ad_slot_width(this: &AdsRequest, width: u32);

        #[wasm_bindgen(method, setter = linearAdSlotHeight)]
        pub fn set_linear_ad_slot_height(this: &AdsRequest, height: u32);

        #[wasm_bindgen(method, setter = nonLinearAdSlotWidth)]
        pub fn set_non_linear_ad_slot_width(this: &AdsRequest, width: u32);

        #[wasm_bindgen(method, setter = nonLinearAdSlotHeight)]
        pub fn set_non_linear_ad_slot_height(this: &AdsRequest, height: u32);

        #[wasm_bindgen(method, js_name = setAdWillAutoPlay)]
        pub fn set_ad_will_auto_play(this: &AdsRequest, auto_play: bool);

        #[wasm_bindgen(method, js_name = setAdWillPlayMuted)]
        pub fn set_ad_will_play_muted(this: &AdsRequest, muted: bool);

        #[wasm_bindgen(js_namespace = ["google", "ima"])]
        pub type AdsRenderingSettings;

        #[wasm_bindgen(constructor, js_namespace = ["google", "ima"])]
        pub fn new() -> AdsRenderingSettings;

        #[wasm_bindgen(method, setter = restoreCustomPlaybackStateOnAdBreakComplete)]
        pub fn set_restore_custom_playback_state_on_ad_break_complete(this: &AdsRenderingSettings, restore: bool);

        pub type AdsManagerLoadedEvent;

        #[wasm_bindgen(method, catch, js_name = getAdsManager)]
        pub fn get_ads_manager(
            this: &AdsManagerLoadedEvent,
            content: &HtmlMediaElement,
            settings: &AdsRenderingSettings,
        ) -> Result<AdsManager, JsValue>;

        pub type AdsManager;

        #[wasm_bindgen(method, js_name = addEventListener)]
        pub fn add_event_listener(this: &AdsManager, kind: &str, handler: &js_sys::Function, capture: bool);

        #[wasm_bindgen(method, js_name = removeEventListener)]
        pub fn remove_event_listener(this: &AdsManager, kind: &str, handler: &js_sys::Function, capture: bool);

        #[wasm_bindgen(method, catch)]
        pub fn init(this: &AdsManager, width: u32, height: u32, mode: &str) -> Result<(), JsValue>;

        #[wasm_bindgen(method, catch)]
        pub fn start(this: &AdsManager) -> Result<(), JsValue>;

        #[wasm_bindgen(method)]
        pub fn pause(this: &AdsManager);

        #[wasm_bindgen(method)]
        pub fn resume(this: &AdsManager);

        #[wasm_bindgen(method)]
        pub fn resize(this: &AdsManager, width: u32, height: u32, mode: &str);

        #[wasm_bindgen(method, js_name = getRemainingTime)]
        pub fn get_remaining_time(this: &AdsManager) -> f64;

        #[wasm_bindgen(method)]
        pub fn destroy(this: &AdsManager);

        pub type AdErrorEvent;

        #[wasm_bindgen(method, js_name = getError)]
        pub fn get_error(this: &AdErrorEvent) -> AdError;

        pub type AdError;

        #[wasm_bindgen(method, js_name = getErrorCode)]
        pub fn get_error_code(this: &AdError) -> i32;

        #[wasm_bindgen(method, js_name = getMessage)]
        pub fn get_message(this: &AdError) -> String;

        pub type AdEvent;

        #[wasm_bindgen(method, js_name = getAd)]
        pub fn get_ad(this: &AdEvent) -> Option<Ad>;

        pub type Ad;

        #[wasm_bindgen(method, js_name = getAdId)]
        pub fn get_ad_id(this: &Ad) -> String;

        #[wasm_bindgen(method, js_name = isLinear)]
        pub fn is_linear(this: &Ad) -> bool;

        #[wasm_bindgen(method, js_name = getDuration)]
        pub fn get_duration(this: &Ad) -> f64;
    }
}

/// `google.ima.ImaSdkSettings.VpaidMode`
const VPAID_ENABLED: u32 = 1;
const VPAID_INSECURE: u32 = 2;

const MANAGER_LOADED: &str = "adsManagerLoaded";
const AD_ERROR: &str = "adError";

/// IMA "unexpected error" code, used when a call throws a non-IMA error
const UNEXPECTED_ERROR: i32 = 900;

type SdkCallback = Closure<dyn FnMut(JsValue)>;

/// Registered SDK callbacks, kept alive until removed
#[derive(Default)]
struct Callbacks {
    entries: RefCell<HashMap<SubscriptionId, (&'static str, SdkCallback)>>,
    next_id: Cell<u64>,
}

impl Callbacks {
    fn insert(&self, kind: &'static str, callback: SdkCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.entries.borrow_mut().insert(id, (kind, callback));
        id
    }

    fn remove(&self, id: SubscriptionId) -> Option<(&'static str, SdkCallback)> {
        self.entries.borrow_mut().remove(&id)
    }

    fn drain(&self) -> Vec<(&'static str, SdkCallback)> {
        self.entries.borrow_mut().drain().map(|(_, entry)| entry).collect()
    }
}

fn thrown(err: &JsValue) -> AdError {
    AdError::new(
        UNEXPECTED_ERROR,
        error_message(err).unwrap_or_else(|| "IMA call failed".to_string()),
    )
}

fn ad_error(event: &sys::AdErrorEvent) -> AdError {
    let error = event.get_error();
    AdError::new(error.get_error_code(), error.get_message())
}

fn ad_info(ad: &sys::Ad) -> AdInfo {
    let ad_id = ad.get_ad_id();
    let duration = ad.get_duration();
    AdInfo {
        ad_id: (!ad_id.is_empty()).then_some(ad_id),
        linear: ad.is_linear(),
        duration: (duration >= 0.0).then_some(duration),
    }
}

fn view_mode(mode: ViewMode) -> &'static str {
    match mode {
        ViewMode::Normal => "normal",
        ViewMode::Fullscreen => "fullscreen",
    }
}

/// The `google.ima` namespace, resolved once its script has loaded
pub struct ImaSdk {
    video: HtmlMediaElement,
    display: RefCell<Option<sys::AdDisplayContainer>>,
}

impl ImaSdk {
    /// `Some` once `google.ima.AdsLoader` is defined on the page
    pub fn probe(video: &HtmlMediaElement) -> Option<Self> {
        global_path(&["google", "ima", "AdsLoader"])
            .filter(JsValue::is_function)
            .map(|_| Self {
                video: video.clone(),
                display: RefCell::new(None),
            })
    }

    fn fallback_node(&self) -> Element {
        self.video
            .parent_element()
            .unwrap_or_else(|| self.video.clone().into())
    }
}

impl AdSdk for ImaSdk {
    fn set_vpaid_insecure(&self, insecure: bool) {
        sys::set_vpaid_mode(if insecure { VPAID_INSECURE } else { VPAID_ENABLED });
    }

    fn create_display_container(&self, overlay: &dyn OverlayContainer) -> Rc<dyn AdDisplayContainer> {
        let node = overlay
            .as_any()
            .downcast_ref::<DomOverlay>()
            .and_then(|overlay| overlay.node().cloned())
            .or_else(|| {
                self.video
                    .owner_document()
                    .and_then(|document| document.get_element_by_id(overlay.id()))
            })
            .unwrap_or_else(|| self.fallback_node());

        let display = sys::AdDisplayContainer::new(&node, &self.video);
        *self.display.borrow_mut() = Some(display.clone());
        Rc::new(ImaDisplay { display })
    }

    fn create_loader(&self, _display: &Rc<dyn AdDisplayContainer>) -> Rc<dyn AdsLoader> {
        let display = self.display.borrow_mut().take();
        let display = display.unwrap_or_else(|| sys::AdDisplayContainer::new(&self.fallback_node(), &self.video));
        Rc::new(ImaLoader {
            loader: sys::AdsLoader::new(&display),
            video: self.video.clone(),
            callbacks: Callbacks::default(),
        })
    }
}

struct ImaDisplay {
    display: sys::AdDisplayContainer,
}

impl AdDisplayContainer for ImaDisplay {
    fn initialize(&self) {
        self.display.initialize();
    }

    fn destroy(&self) {
        self.display.destroy();
    }
}

struct ImaLoader {
    loader: sys::AdsLoader,
    video: HtmlMediaElement,
    callbacks: Callbacks,
}

impl ImaLoader {
    fn listen(&self, kind: &'static str, callback: SdkCallback) -> SubscriptionId {
        self.loader
            .add_event_listener(kind, callback.as_ref().unchecked_ref(), false);
        self.callbacks.insert(kind, callback)
    }

    fn unlisten(&self, kind: &str, callback: &SdkCallback) {
        self.loader
            .remove_event_listener(kind, callback.as_ref().unchecked_ref(), false);
    }
}

impl AdsLoader for ImaLoader {
    fn disable_custom_playback_for_ios10_plus(&self, disabled: bool) {
        self.loader
            .get_settings()
            .set_disable_custom_playback_for_ios10_plus(disabled);
    }

    fn on_manager_loaded(&self, handler: ManagerLoadedHandler) -> SubscriptionId {
        let video = self.video.clone();
        let callback: SdkCallback = Closure::new(move |event: JsValue| {
            handler(Rc::new(ImaManagerLoaded {
                event: event.unchecked_into(),
                video: video.clone(),
            }));
        });
        self.listen(MANAGER_LOADED, callback)
    }

    fn on_error(&self, handler: AdErrorHandler) -> SubscriptionId {
        let callback: SdkCallback = Closure::new(move |event: JsValue| {
            handler(&ad_error(event.unchecked_ref()));
        });
        self.listen(AD_ERROR, callback)
    }

    fn off(&self, id: SubscriptionId) {
        if let Some((kind, callback)) = self.callbacks.remove(id) {
            self.unlisten(kind, &callback);
        }
    }

    fn request_ads(&self, request: &AdsRequest) {
        let sdk_request = sys::AdsRequest::new();
        sdk_request.set_ad_tag_url(&request.ad_tag_url);
        sdk_request.set_linear_ad_slot_width(request.linear_ad_slot_width);
        sdk_request.set_linear_ad_slot_height(request.linear_ad_slot_height);
        sdk_request.set_non_linear_ad_slot_width(request.non_linear_ad_slot_width);
        sdk_request.set_non_linear_ad_slot_height(request.non_linear_ad_slot_height);
        sdk_request.set_ad_will_auto_play(request.auto_play_allowed);
        sdk_request.set_ad_will_play_muted(request.play_muted);
        self.loader.request_ads(&sdk_request);
    }

    fn content_complete(&self) {
        self.loader.content_complete();
    }

    fn destroy(&self) {
        for (kind, callback) in self.callbacks.drain() {
            self.unlisten(kind, &callback);
        }
        self.loader.destroy();
    }
}

struct ImaManagerLoaded {
    event: sys::AdsManagerLoadedEvent,
    video: HtmlMediaElement,
}

impl AdsManagerLoaded for ImaManagerLoaded {
    fn ads_manager(&self, settings: &AdsRenderingSettings) -> Result<Rc<dyn AdsManager>, AdError> {
        let rendering = sys::AdsRenderingSettings::new();
        rendering.set_restore_custom_playback_state_on_ad_break_complete(
            settings.restore_custom_playback_state_on_ad_break_complete,
        );

        let manager = self
            .event
            .get_ads_manager(&self.video, &rendering)
            .map_err(|err| thrown(&err))?;
        Ok(Rc::new(ImaManager {
            manager,
            callbacks: Callbacks::default(),
        }))
    }
}

struct ImaManager {
    manager: sys::AdsManager,
    callbacks: Callbacks,
}

impl ImaManager {
    fn listen(&self, kind: &'static str, callback: SdkCallback) -> SubscriptionId {
        self.manager
            .add_event_listener(kind, callback.as_ref().unchecked_ref(), false);
        self.callbacks.insert(kind, callback)
    }

    fn unlisten(&self, kind: &str, callback: &SdkCallback) {
        self.manager
            .remove_event_listener(kind, callback.as_ref().unchecked_ref(), false);
    }
}

impl AdsManager for ImaManager {
    fn on(&self, kind: AdEventType, handler: AdEventHandler) -> SubscriptionId {
        let callback: SdkCallback = Closure::new(move |event: JsValue| {
            let event: &sys::AdEvent = event.unchecked_ref();
            let ad_event = match event.get_ad() {
                Some(ad) => AdEvent::new(kind).with_ad(ad_info(&ad)),
                None => AdEvent::new(kind),
            };
            handler(&ad_event);
        });
        self.listen(kind.sdk_name(), callback)
    }

    fn on_error(&self, handler: AdErrorHandler) -> SubscriptionId {
        let callback: SdkCallback = Closure::new(move |event: JsValue| {
            handler(&ad_error(event.unchecked_ref()));
        });
        self.listen(AD_ERROR, callback)
    }

    fn off(&self, id: SubscriptionId) {
        if let Some((kind, callback)) = self.callbacks.remove(id) {
            self.unlisten(kind, &callback);
        }
    }

    fn init(&self, width: u32, height: u32, mode: ViewMode) -> Result<(), AdError> {
        self.manager
            .init(width, height, view_mode(mode))
            .map_err(|err| thrown(&err))
    }

    fn start(&self) -> Result<(), AdError> {
        self.manager.start().map_err(|err| thrown(&err))
    }

    fn pause(&self) {
        self.manager.pause();
    }

    fn resume(&self) {
        self.manager.resume();
    }

    fn resize(&self, width: u32, height: u32, mode: ViewMode) {
        self.manager.resize(width, height, view_mode(mode));
    }

    fn remaining_time(&self) -> Option<f64> {
        let remaining = self.manager.get_remaining_time();
        (remaining.is_finite() && remaining >= 0.0).then_some(remaining)
    }

    fn destroy(&self) {
        for (kind, callback) in self.callbacks.drain() {
            self.unlisten(kind, &callback);
        }
        self.manager.destroy();
    }
}
