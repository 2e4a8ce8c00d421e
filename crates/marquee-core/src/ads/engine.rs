//! Ad-insertion engine boundary (Google IMA capability surface)

use crate::host::OverlayContainer;
use crate::subscription::SubscriptionId;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use thiserror::Error;

/// Error reported by the ad loader or ads manager
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct AdError {
    pub code: i32,
    pub message: String,
}

impl AdError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Ad request sent by the loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdsRequest {
    pub ad_tag_url: String,
    pub linear_ad_slot_width: u32,
    pub linear_ad_slot_height: u32,
    pub non_linear_ad_slot_width: u32,
    pub non_linear_ad_slot_height: u32,
    pub auto_play_allowed: bool,
    pub play_muted: bool,
}

/// Rendering settings passed when the ads manager is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdsRenderingSettings {
    /// Restore the content element's playback state after each ad break
    pub restore_custom_playback_state_on_ad_break_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMode {
    Normal,
    Fullscreen,
}

/// Ads manager lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdEventType {
    ContentPauseRequested,
    ContentResumeRequested,
    AllAdsCompleted,
    Click,
    Complete,
    FirstQuartile,
    Loaded,
    Midpoint,
    Paused,
    Started,
    ThirdQuartile,
}

impl AdEventType {
    /// Events forwarded to host listeners
    pub const LIFECYCLE: [AdEventType; 9] = [
        AdEventType::AllAdsCompleted,
        AdEventType::Click,
        AdEventType::Complete,
        AdEventType::FirstQuartile,
        AdEventType::Loaded,
        AdEventType::Midpoint,
        AdEventType::Paused,
        AdEventType::Started,
        AdEventType::ThirdQuartile,
    ];

    /// Name of the SDK event type
    pub fn sdk_name(&self) -> &'static str {
        match self {
            AdEventType::ContentPauseRequested => "contentPauseRequested",
            AdEventType::ContentResumeRequested => "contentResumeRequested",
            AdEventType::AllAdsCompleted => "allAdsCompleted",
            AdEventType::Click => "click",
            AdEventType::Complete => "complete",
            AdEventType::FirstQuartile => "firstQuartile",
            AdEventType::Loaded => "loaded",
            AdEventType::Midpoint => "midpoint",
            AdEventType::Paused => "pause",
            AdEventType::Started => "start",
            AdEventType::ThirdQuartile => "thirdQuartile",
        }
    }

    /// Canonical name dispatched on the element. Prefixed so ad lifecycle
    /// events never collide with content `play`/`pause`.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            AdEventType::ContentPauseRequested => "adscontentpauserequested",
            AdEventType::ContentResumeRequested => "adscontentresumerequested",
            AdEventType::AllAdsCompleted => "adsmediaended",
            AdEventType::Click => "adsclick",
            AdEventType::Complete => "adscomplete",
            AdEventType::FirstQuartile => "adsfirstquartile",
            AdEventType::Loaded => "adsloaded",
            AdEventType::Midpoint => "adsmidpoint",
            AdEventType::Paused => "adspaused",
            AdEventType::Started => "adsstarted",
            AdEventType::ThirdQuartile => "adsthirdquartile",
        }
    }
}

/// The ad an event refers to
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdInfo {
    pub ad_id: Option<String>,
    pub linear: bool,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdEvent {
    pub kind: AdEventType,
    pub ad: Option<AdInfo>,
}

impl AdEvent {
    pub fn new(kind: AdEventType) -> Self {
        Self { kind, ad: None }
    }

    pub fn with_ad(mut self, ad: AdInfo) -> Self {
        self.ad = Some(ad);
        self
    }

    pub fn is_linear(&self) -> bool {
        self.ad.as_ref().map(|ad| ad.linear).unwrap_or(false)
    }
}

pub type AdEventHandler = Rc<dyn Fn(&AdEvent)>;
pub type AdErrorHandler = Rc<dyn Fn(&AdError)>;
pub type ManagerLoadedHandler = Rc<dyn Fn(Rc<dyn AdsManagerLoaded>)>;

/// Entry point of the ad SDK, resolved once its script has loaded
pub trait AdSdk {
    fn set_vpaid_insecure(&self, insecure: bool);

    /// Display container rendering into `overlay` on top of the media element
    fn create_display_container(&self, overlay: &dyn OverlayContainer) -> Rc<dyn AdDisplayContainer>;

    fn create_loader(&self, display: &Rc<dyn AdDisplayContainer>) -> Rc<dyn AdsLoader>;
}

pub trait AdDisplayContainer {
    /// Must run inside a user gesture on mobile
    fn initialize(&self);
    fn destroy(&self);
}

pub trait AdsLoader {
    fn disable_custom_playback_for_ios10_plus(&self, disabled: bool);
    fn on_manager_loaded(&self, handler: ManagerLoadedHandler) -> SubscriptionId;
    fn on_error(&self, handler: AdErrorHandler) -> SubscriptionId;
    fn off(&self, id: SubscriptionId);
    fn request_ads(&self, request: &AdsRequest);

    /// Signal that content finished so post-rolls can play
    fn content_complete(&self);
    fn destroy(&self);
}

/// Payload of the loader's "ads manager loaded" event
pub trait AdsManagerLoaded {
    fn ads_manager(&self, settings: &AdsRenderingSettings) -> Result<Rc<dyn AdsManager>, AdError>;
}

pub trait AdsManager {
    fn on(&self, kind: AdEventType, handler: AdEventHandler) -> SubscriptionId;
    fn on_error(&self, handler: AdErrorHandler) -> SubscriptionId;
    fn off(&self, id: SubscriptionId);

    fn init(&self, width: u32, height: u32, mode: ViewMode) -> Result<(), AdError>;
    fn start(&self) -> Result<(), AdError>;
    fn pause(&self);
    fn resume(&self);
    fn resize(&self, width: u32, height: u32, mode: ViewMode);

    /// Seconds left in the current ad, when the SDK can tell
    fn remaining_time(&self) -> Option<f64>;
    fn destroy(&self);
}
