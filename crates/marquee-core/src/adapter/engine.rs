//! Streaming engine boundary (dash.js `MediaPlayer` capability surface)

use crate::event::BackendEvent;
use crate::subscription::SubscriptionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;

/// Handler for engine events
pub type EngineHandler = Rc<dyn Fn(&BackendEvent)>;

/// Track type for quality queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

/// One entry of the engine's bitrate list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitrateInfo {
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub scan_type: Option<String>,
    pub quality_index: usize,
}

impl BitrateInfo {
    /// Display label: the scan type when reported, else the line count
    pub fn label(&self) -> String {
        match self.scan_type.as_deref() {
            Some(scan) if !scan.is_empty() => scan.to_string(),
            _ => format!("{}p", self.height),
        }
    }
}

/// A streaming engine instance.
///
/// The instance is created for one media element; `attach_view` binds it to
/// that element.
pub trait StreamingEngine {
    /// Deep-merge settings into the engine's current settings
    fn update_settings(&self, settings: &Value);

    /// Current effective settings
    fn settings(&self) -> Value;

    fn initialize(&self);
    fn attach_view(&self);
    fn attach_source(&self, url: &str);
    fn set_auto_play(&self, enabled: bool);

    fn bitrate_info_list(&self, track: TrackKind) -> Vec<BitrateInfo>;
    fn set_quality_for(&self, track: TrackKind, index: usize);
    fn quality_for(&self, track: TrackKind) -> Option<usize>;

    /// Every event name the engine can emit
    fn event_names(&self) -> Vec<String>;

    fn on(&self, event: &str, handler: EngineHandler) -> SubscriptionId;
    fn off(&self, event: &str, id: SubscriptionId);

    /// Tear down the engine and detach it from the element
    fn reset(&self);
}

/// Creates engine instances (`MediaPlayer().create()`)
pub trait StreamingEngineFactory {
    fn create(&self) -> Rc<dyn StreamingEngine>;
}
