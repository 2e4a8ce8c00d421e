//! `ScriptLoader` that appends a `<script>` tag and waits for it to load

use crate::js_error;
use async_trait::async_trait;
use marquee_core::sdk::ScriptLoader;
use marquee_core::{Error, Result};
use tracing::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, Element, HtmlScriptElement};

pub struct DomScriptLoader {
    document: Document,
}

impl DomScriptLoader {
    pub fn new() -> std::result::Result<Self, JsValue> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| js_error("no document to load scripts into"))?;
        Ok(Self { document })
    }

    fn append(&self, url: &str) -> std::result::Result<js_sys::Promise, JsValue> {
        let script: HtmlScriptElement = self
            .document
            .create_element("script")?
            .dyn_into()
            .map_err(JsValue::from)?;
        script.set_src(url);
        script.set_async(true);

        let loaded = js_sys::Promise::new(&mut |resolve, reject| {
            script.set_onload(Some(&resolve));
            script.set_onerror(Some(&reject));
        });

        let parent: Element = match (self.document.head(), self.document.body()) {
            (Some(head), _) => head.into(),
            (None, Some(body)) => body.into(),
            (None, None) => return Err(js_error("document has neither head nor body")),
        };
        parent.append_child(&script)?;
        Ok(loaded)
    }
}

#[async_trait(?Send)]
impl ScriptLoader for DomScriptLoader {
    async fn load_script(&self, url: &str) -> Result<()> {
        let failed = |err: JsValue| Error::ScriptLoad {
            url: url.to_string(),
            reason: crate::error_message(&err).unwrap_or_else(|| "script failed to load".to_string()),
        };

        let loaded = self.append(url).map_err(failed)?;
        JsFuture::from(loaded).await.map_err(failed)?;
        debug!(url, "Script loaded");
        Ok(())
    }
}
