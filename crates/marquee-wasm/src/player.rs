//! `MarqueePlayer`: the session facade exported to JavaScript

use crate::dash::DashEngineFactory;
use crate::element::DomElement;
use crate::host::BrowserHost;
use crate::ima::ImaSdk;
use crate::script::DomScriptLoader;
use crate::{js_error, to_js};
use marquee_core::host::HostEnv;
use marquee_core::{resolve_capability, Error, LevelId, PlayerConfig, Session, Source};
use serde::Deserialize;
use std::rc::Rc;
use tracing::{error, info, warn};
use wasm_bindgen::prelude::*;
use web_sys::HtmlMediaElement;

fn core_error(err: Error) -> JsValue {
    js_error(format!("[{}] {}", err.error_code(), err))
}

/// `{ src, type }` as written by page scripts; `type` is optional
#[derive(Deserialize)]
struct SourceInput {
    src: String,
    #[serde(rename = "type", default)]
    mime: Option<String>,
}

impl From<SourceInput> for Source {
    fn from(input: SourceInput) -> Self {
        match input.mime.filter(|mime| !mime.is_empty()) {
            Some(mime) => Source::new(input.src, mime),
            None => Source::from_url(input.src),
        }
    }
}

/// A URL string, one `{ src, type }` object or an array of them
fn parse_sources(value: JsValue) -> Result<Vec<Source>, JsValue> {
    if let Some(url) = value.as_string() {
        return Ok(vec![Source::from_url(url)]);
    }
    if js_sys::Array::is_array(&value) {
        let inputs: Vec<SourceInput> = serde_wasm_bindgen::from_value(value)?;
        return Ok(inputs.into_iter().map(Source::from).collect());
    }
    let input: SourceInput = serde_wasm_bindgen::from_value(value)?;
    Ok(vec![input.into()])
}

fn parse_config(value: JsValue) -> Result<PlayerConfig, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(PlayerConfig::default());
    }
    let config: PlayerConfig = serde_wasm_bindgen::from_value(value)?;
    config.validate().map_err(core_error)?;
    Ok(config)
}

async fn resolve_dash(
    loader: &DomScriptLoader,
    config: &PlayerConfig,
    element: &HtmlMediaElement,
) -> marquee_core::Result<DashEngineFactory> {
    match config.dash_sdk_url.as_deref() {
        Some(url) => resolve_capability(loader, "dashjs", url, || DashEngineFactory::probe(element)).await,
        None => DashEngineFactory::probe(element).ok_or_else(|| Error::SdkUnavailable {
            sdk: "dashjs".to_string(),
        }),
    }
}

/// Load the ad SDK when a tag is configured or `preload_sdk` asks for it;
/// otherwise use it only if the page already has it
async fn resolve_ads(
    loader: &DomScriptLoader,
    config: &PlayerConfig,
    element: &HtmlMediaElement,
) -> marquee_core::Result<Option<ImaSdk>> {
    if config.ads.active_tag().is_none() && !config.ads.preload_sdk {
        return Ok(ImaSdk::probe(element));
    }
    resolve_capability(loader, "google.ima", &config.ads.sdk_url, || ImaSdk::probe(element))
        .await
        .map(Some)
}

/// Player bound to one `<video>`/`<audio>` element.
///
/// Canonical events (`play`, `playing`, `pause`, `ended`, `loadedmetadata`,
/// `playererror`, `adsmediaended`, `ads*`) are dispatched on the element
/// itself.
#[wasm_bindgen]
pub struct MarqueePlayer {
    session: Rc<Session>,
}

#[wasm_bindgen]
impl MarqueePlayer {
    /// Build a player, loading dash.js and the IMA SDK when needed.
    ///
    /// A missing ad SDK degrades to content-only playback; a missing
    /// streaming engine leaves DASH sources to the native backend.
    pub async fn create(
        element: HtmlMediaElement,
        sources: JsValue,
        config: JsValue,
    ) -> Result<MarqueePlayer, JsValue> {
        let config = parse_config(config)?;
        let sources = parse_sources(sources)?;
        let host = Rc::new(BrowserHost::new()?);
        let loader = DomScriptLoader::new()?;
        let dom = Rc::new(DomElement::new(element.clone()));

        let mut builder = Session::builder(dom, host.clone());
        if host.capabilities().media_source_extensions && sources.iter().any(Source::is_dash) {
            match resolve_dash(&loader, &config, &element).await {
                Ok(engines) => builder = builder.dash(Rc::new(engines), config.streaming.clone()),
                Err(err) => warn!(error = %err, "Streaming engine unavailable"),
            }
        }
        builder = builder.native();

        match resolve_ads(&loader, &config, &element).await {
            Ok(Some(sdk)) => builder = builder.ads(Rc::new(sdk), config.ads.clone()),
            Ok(None) => {}
            Err(err) => error!(error = %err, "Ad SDK unavailable, playing content only"),
        }

        let session = builder.build(&sources).map_err(core_error)?;
        info!(session_id = %session.id(), "MarqueePlayer created");
        Ok(MarqueePlayer { session })
    }

    #[wasm_bindgen(getter)]
    pub fn id(&self) -> String {
        self.session.id().to_string()
    }

    /// `"native"`, `"DASH"`, or `undefined` once destroyed
    #[wasm_bindgen(getter)]
    pub fn family(&self) -> Option<String> {
        self.session.family().map(|family| family.as_str().to_string())
    }

    #[wasm_bindgen(getter, js_name = adPhase)]
    pub fn ad_phase(&self) -> JsValue {
        to_js(&self.session.ad_phase())
    }

    pub fn load(&self) {
        self.session.load();
    }

    pub fn play(&self) {
        self.session.play();
    }

    pub fn pause(&self) {
        self.session.pause();
    }

    #[wasm_bindgen(getter)]
    pub fn paused(&self) -> bool {
        self.session.paused()
    }

    #[wasm_bindgen(getter)]
    pub fn ended(&self) -> bool {
        self.session.ended()
    }

    #[wasm_bindgen(getter)]
    pub fn volume(&self) -> f64 {
        self.session.volume()
    }

    #[wasm_bindgen(setter)]
    pub fn set_volume(&self, volume: f64) {
        self.session.set_volume(volume);
    }

    #[wasm_bindgen(getter)]
    pub fn muted(&self) -> bool {
        self.session.muted()
    }

    #[wasm_bindgen(setter)]
    pub fn set_muted(&self, muted: bool) {
        self.session.set_muted(muted);
    }

    /// `[{ id, label, height }]`, empty for backends without a ladder
    #[wasm_bindgen(getter)]
    pub fn levels(&self) -> JsValue {
        to_js(&self.session.levels())
    }

    /// Selected level id; `"-1"` is automatic switching
    #[wasm_bindgen(getter)]
    pub fn level(&self) -> String {
        self.session.level().to_string()
    }

    #[wasm_bindgen(setter)]
    pub fn set_level(&self, level: String) {
        match level.parse::<LevelId>() {
            Ok(level) => self.session.set_level(level),
            Err(_) => warn!(level = %level, "Ignoring unknown level id"),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn src(&self) -> Option<String> {
        self.session.source().map(|source| source.src)
    }

    /// Bare URL; the MIME type is predicted from the extension
    #[wasm_bindgen(setter)]
    pub fn set_src(&self, src: String) {
        if let Err(err) = self.session.set_source(Source::from_url(src)) {
            warn!(error = %err, "Source rejected");
        }
    }

    /// Replace the source list, rebuilding the backend when needed
    #[wasm_bindgen(js_name = setSources)]
    pub fn set_sources(&self, sources: JsValue) -> Result<(), JsValue> {
        let sources = parse_sources(sources)?;
        self.session.set_sources(&sources).map_err(core_error)
    }

    /// Arm an ad tag for the next source change; `null` disarms it.
    ///
    /// Throws when the player was created without the ad SDK (no tag, no
    /// `ads.preload_sdk`, and no `google.ima` already on the page).
    #[wasm_bindgen(js_name = setAdTag)]
    pub fn set_ad_tag(&self, tag: Option<String>) -> Result<(), JsValue> {
        self.session.set_ad_tag(tag.as_deref()).map_err(core_error)
    }

    #[wasm_bindgen(js_name = controlsChanged)]
    pub fn controls_changed(&self) {
        self.session.controls_changed();
    }

    /// Resolves once the backend can accept commands
    pub fn ready(&self) -> js_sys::Promise {
        let ready = self.session.ready();
        wasm_bindgen_futures::future_to_promise(async move {
            ready.wait().await.map_err(core_error)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    pub fn destroy(&self) {
        self.session.destroy();
    }
}
