//! Ad overlay
//!
//! [`AdOverlay`] decorates a content adapter with an ad-insertion engine
//! reached through the [`AdSdk`] capability traits in [`engine`].

pub mod engine;
mod overlay;

pub use engine::{
    AdDisplayContainer, AdError, AdErrorHandler, AdEvent, AdEventHandler, AdEventType, AdInfo, AdSdk, AdsLoader,
    AdsManager, AdsManagerLoaded, AdsRenderingSettings, AdsRequest, ManagerLoadedHandler, ViewMode,
};
pub use overlay::{AdFlags, AdOverlay, AdPhase, AD_ACTIVE_CLASS, AD_CONTAINER_ID};

use crate::adapter::MediaAdapter;
use crate::config::AdsConfig;
use crate::host::{HostEnv, MediaElement};
use std::rc::Rc;

/// A resolved ad SDK plus what every overlay needs from the page
#[derive(Clone)]
pub struct AdBackend {
    pub sdk: Rc<dyn AdSdk>,
    pub host: Rc<dyn HostEnv>,
    pub config: AdsConfig,
}

impl AdBackend {
    pub fn new(sdk: Rc<dyn AdSdk>, host: Rc<dyn HostEnv>, config: AdsConfig) -> Self {
        Self { sdk, host, config }
    }

    /// Wrap `content` in an overlay that plays `tag_url` first
    pub fn wrap(&self, content: Rc<dyn MediaAdapter>, element: Rc<dyn MediaElement>, tag_url: &str) -> AdOverlay {
        AdOverlay::new(
            content,
            element,
            self.host.clone(),
            self.sdk.clone(),
            self.config.clone(),
            tag_url,
        )
    }
}
