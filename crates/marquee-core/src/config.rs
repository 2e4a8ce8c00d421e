//! Player configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

/// Default location of the IMA SDK loader
pub const IMA_SDK_URL: &str = "https://imasdk.googleapis.com/js/sdkloader/ima3.js";

/// Top-level player configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Ad insertion settings
    pub ads: AdsConfig,
    /// Streaming engine settings
    pub streaming: StreamingConfig,
    /// Script URL for hosts that lazy-load the streaming engine
    pub dash_sdk_url: Option<String>,
}

impl PlayerConfig {
    /// Parse a JSON configuration object
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.ads.validate()
    }
}

/// Ad insertion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsConfig {
    /// VAST/VMAP tag; an empty or missing tag disables ads
    pub tag_url: Option<String>,
    /// Loader script for the ad-insertion SDK
    pub sdk_url: String,
    /// Load the SDK even without a tag, so one can be armed later
    pub preload_sdk: bool,
    /// Allow VPAID creatives to run outside a sandboxed iframe
    pub vpaid_insecure: bool,
    /// Height reserved for non-linear (overlay) ads
    pub non_linear_height: u32,
    /// Remaining-time poll period while a linear ad plays
    pub remaining_time_poll_ms: u64,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            tag_url: None,
            sdk_url: IMA_SDK_URL.to_string(),
            preload_sdk: false,
            vpaid_insecure: true,
            non_linear_height: 150,
            remaining_time_poll_ms: 300,
        }
    }
}

impl AdsConfig {
    /// The configured tag, if it is non-empty
    pub fn active_tag(&self) -> Option<&str> {
        self.tag_url
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(tag) = self.active_tag() {
            Url::parse(tag)
                .map_err(|e| Error::InvalidConfig(format!("ad tag {:?}: {}", tag, e)))?;
        }
        if self.remaining_time_poll_ms == 0 {
            return Err(Error::InvalidConfig(
                "remaining_time_poll_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Streaming engine log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    None,
    Fatal,
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// Numeric level understood by the engine
    pub fn as_engine_level(&self) -> u8 {
        match self {
            LogLevel::None => 0,
            LogLevel::Fatal => 1,
            LogLevel::Error => 2,
            LogLevel::Warning => 3,
            LogLevel::Info => 4,
            LogLevel::Debug => 5,
        }
    }
}

/// Streaming engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub log_level: LogLevel,
    /// Cap the bitrate to what the rendered size can show
    pub limit_bitrate_by_portal: bool,
    pub fast_switch_enabled: bool,
    /// Keep downloading segments while paused
    pub schedule_while_paused: bool,
    /// Raw settings merged over the defaults, key by key at the top level
    pub overrides: Value,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Error,
            limit_bitrate_by_portal: true,
            fast_switch_enabled: true,
            schedule_while_paused: false,
            overrides: Value::Object(Map::new()),
        }
    }
}

impl StreamingConfig {
    /// Render the settings object handed to the engine's `updateSettings`
    pub fn settings(&self) -> Value {
        let mut settings = json!({
            "debug": {
                "logLevel": self.log_level.as_engine_level(),
            },
            "streaming": {
                "abr": {
                    "limitBitrateByPortal": self.limit_bitrate_by_portal,
                },
                "buffer": {
                    "fastSwitchEnabled": self.fast_switch_enabled,
                },
                "scheduling": {
                    "scheduleWhilePaused": self.schedule_while_paused,
                },
            },
        });

        if let (Some(base), Some(overrides)) = (settings.as_object_mut(), self.overrides.as_object()) {
            for (key, value) in overrides {
                base.insert(key.clone(), value.clone());
            }
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.ads.sdk_url, IMA_SDK_URL);
        assert_eq!(config.ads.non_linear_height, 150);
        assert_eq!(config.ads.remaining_time_poll_ms, 300);
        assert!(config.ads.active_tag().is_none());
        assert!(!config.ads.preload_sdk);
        assert_eq!(config.streaming.log_level, LogLevel::Error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_settings() {
        let settings = StreamingConfig::default().settings();
        assert_eq!(settings["debug"]["logLevel"], 2);
        assert_eq!(settings["streaming"]["abr"]["limitBitrateByPortal"], true);
        assert_eq!(settings["streaming"]["buffer"]["fastSwitchEnabled"], true);
        assert_eq!(settings["streaming"]["scheduling"]["scheduleWhilePaused"], false);
    }

    #[test]
    fn test_overrides_replace_top_level_keys() {
        let config = StreamingConfig {
            overrides: json!({ "debug": { "logLevel": 5 }, "errors": { "recoverAttempts": 3 } }),
            ..Default::default()
        };
        let settings = config.settings();
        assert_eq!(settings["debug"], json!({ "logLevel": 5 }));
        assert_eq!(settings["errors"]["recoverAttempts"], 3);
        assert_eq!(settings["streaming"]["buffer"]["fastSwitchEnabled"], true);
    }

    #[test]
    fn test_from_json_validates_tag() {
        let config = PlayerConfig::from_json(r#"{ "ads": { "tag_url": "http://ads.example/tag" } }"#).unwrap();
        assert_eq!(config.ads.active_tag(), Some("http://ads.example/tag"));

        let blank = PlayerConfig::from_json(r#"{ "ads": { "tag_url": "   " } }"#).unwrap();
        assert!(blank.ads.active_tag().is_none());

        let err = PlayerConfig::from_json(r#"{ "ads": { "tag_url": "not a url" } }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = PlayerConfig::from_json(r#"{ "ads": { "remaining_time_poll_ms": 0 } }"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}
