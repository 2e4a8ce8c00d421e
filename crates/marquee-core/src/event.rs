//! Canonical event vocabulary
//!
//! Every adapter speaks this vocabulary on the shared media element. Host UI
//! listeners only ever see these names; backend-native names that have no
//! canonical counterpart are forwarded verbatim with the raw event wrapped in
//! [`EventDetail::Raw`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend family, reported in `playererror` details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendFamily {
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "DASH")]
    Dash,
    #[serde(rename = "ads")]
    Ads,
}

impl BackendFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendFamily::Native => "native",
            BackendFamily::Dash => "DASH",
            BackendFamily::Ads => "ads",
        }
    }
}

impl std::fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical event types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventType {
    LoadedMetadata,
    Play,
    Playing,
    Pause,
    Ended,
    PlayerError,
    AdsMediaEnded,
    ControlsChanged,
    /// Backend event forwarded under its own name
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::LoadedMetadata => "loadedmetadata",
            EventType::Play => "play",
            EventType::Playing => "playing",
            EventType::Pause => "pause",
            EventType::Ended => "ended",
            EventType::PlayerError => "playererror",
            EventType::AdsMediaEnded => "adsmediaended",
            EventType::ControlsChanged => "controlschanged",
            EventType::Other(name) => name,
        }
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        match name {
            "loadedmetadata" => EventType::LoadedMetadata,
            "play" => EventType::Play,
            "playing" => EventType::Playing,
            "pause" => EventType::Pause,
            "ended" => EventType::Ended,
            "playererror" => EventType::PlayerError,
            "adsmediaended" => EventType::AdsMediaEnded,
            "controlschanged" => EventType::ControlsChanged,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        EventType::from(name.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event as reported by a backend engine, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEvent {
    /// Engine-side event name (`"error"`, `"streamActivated"`, ...)
    pub name: String,
    /// Engine payload, opaque to the core
    #[serde(default)]
    pub payload: Value,
}

impl BackendEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Error-type events are always remapped to `playererror`
    pub fn is_error(&self) -> bool {
        self.name == "error"
    }

    /// Best-effort human readable message from the payload
    pub fn message(&self) -> String {
        let from_payload = self
            .payload
            .get("message")
            .or_else(|| self.payload.pointer("/error/message"))
            .and_then(Value::as_str);

        match (from_payload, &self.payload) {
            (Some(message), _) => message.to_string(),
            (None, Value::String(message)) => message.clone(),
            (None, Value::Null) => self.name.clone(),
            (None, other) => other.to_string(),
        }
    }
}

/// Payload attached to a canonical event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventDetail {
    /// `playererror` detail: `{ message, type }`
    Error {
        message: String,
        #[serde(rename = "type")]
        family: BackendFamily,
    },
    /// Raw backend event for advanced consumers: `{ event }`
    Raw { event: BackendEvent },
}

/// Canonical event dispatched on the shared media element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<EventDetail>,
}

impl MediaEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            detail: None,
        }
    }

    pub fn error(message: impl Into<String>, family: BackendFamily) -> Self {
        Self {
            event_type: EventType::PlayerError,
            detail: Some(EventDetail::Error {
                message: message.into(),
                family,
            }),
        }
    }

    pub fn raw(event_type: EventType, event: BackendEvent) -> Self {
        Self {
            event_type,
            detail: Some(EventDetail::Raw { event }),
        }
    }

    pub fn type_name(&self) -> &str {
        self.event_type.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::from("playererror"), EventType::PlayerError);
        assert_eq!(EventType::from("adsmediaended"), EventType::AdsMediaEnded);
        assert_eq!(
            EventType::from("qualityChangeRendered"),
            EventType::Other("qualityChangeRendered".into())
        );
        assert_eq!(EventType::Other("fragmentLoadingCompleted".into()).as_str(), "fragmentLoadingCompleted");
    }

    #[test]
    fn test_error_detail_json_shape() {
        let event = MediaEvent::error("manifest unreachable", BackendFamily::Dash);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "playererror",
                "detail": { "message": "manifest unreachable", "type": "DASH" }
            })
        );
    }

    #[test]
    fn test_backend_message_extraction() {
        let nested = BackendEvent::new("error").with_payload(json!({ "error": { "message": "download failed" } }));
        assert_eq!(nested.message(), "download failed");

        let flat = BackendEvent::new("error").with_payload(json!({ "message": "MEDIA_ERR_DECODE" }));
        assert_eq!(flat.message(), "MEDIA_ERR_DECODE");

        assert_eq!(BackendEvent::new("error").message(), "error");
    }
}
