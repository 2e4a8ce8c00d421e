//! Playable sources and quality levels

use serde::{Deserialize, Serialize};
use url::Url;

pub const MIME_DASH: &str = "application/dash+xml";
pub const MIME_HLS: &str = "application/x-mpegURL";
pub const MIME_MP4: &str = "video/mp4";

/// One playable item. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub src: String,
    #[serde(rename = "type")]
    pub mime: String,
}

impl Source {
    pub fn new(src: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            mime: mime.into(),
        }
    }

    /// Build a source whose type is predicted from the URL
    pub fn from_url(src: impl Into<String>) -> Self {
        let src = src.into();
        let mime = predict_type(&src).to_string();
        Self { src, mime }
    }

    pub fn is_dash(&self) -> bool {
        self.mime.eq_ignore_ascii_case(MIME_DASH)
    }
}

/// Predict a MIME type from the path extension, ignoring query and fragment
pub fn predict_type(src: &str) -> &'static str {
    let path = url_path(src).to_lowercase();
    let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    match extension {
        "mpd" => MIME_DASH,
        "m3u8" | "m3u" => MIME_HLS,
        "mp4" | "m4v" => MIME_MP4,
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        "mp3" => "audio/mp3",
        "m4a" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        _ => MIME_MP4,
    }
}

fn url_path(src: &str) -> String {
    // Relative sources ("media/a.mp4") are resolved against a throwaway base
    let parsed = Url::parse(src).or_else(|_| {
        Url::parse("http://localhost/").and_then(|base| base.join(src))
    });

    match parsed {
        Ok(url) => url.path().to_string(),
        Err(_) => src
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Quality level identifier. `Auto` is the `"-1"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LevelId {
    Auto,
    Index(usize),
}

impl std::fmt::Display for LevelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LevelId::Auto => f.write_str("-1"),
            LevelId::Index(index) => write!(f, "{}", index),
        }
    }
}

impl std::str::FromStr for LevelId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "-1" | "auto" => Ok(LevelId::Auto),
            other => other.parse().map(LevelId::Index),
        }
    }
}

impl From<LevelId> for String {
    fn from(level: LevelId) -> Self {
        level.to_string()
    }
}

impl TryFrom<String> for LevelId {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Read-only snapshot of one rung of the bitrate ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub id: LevelId,
    pub label: String,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_type() {
        assert_eq!(predict_type("https://cdn.example/live/manifest.mpd"), MIME_DASH);
        assert_eq!(predict_type("https://cdn.example/master.m3u8?token=abc"), MIME_HLS);
        assert_eq!(predict_type("a.mp4"), MIME_MP4);
        assert_eq!(predict_type("/media/podcast.MP3#t=10"), "audio/mp3");
        assert_eq!(predict_type("https://cdn.example/clip.webm"), "video/webm");
        assert_eq!(predict_type("https://cdn.example/stream"), MIME_MP4);
    }

    #[test]
    fn test_source_from_url() {
        let source = Source::from_url("https://cdn.example/vod/manifest.mpd");
        assert!(source.is_dash());
        assert_eq!(source.src, "https://cdn.example/vod/manifest.mpd");
    }

    #[test]
    fn test_level_id_sentinel() {
        assert_eq!("-1".parse::<LevelId>().unwrap(), LevelId::Auto);
        assert_eq!("3".parse::<LevelId>().unwrap(), LevelId::Index(3));
        assert!("high".parse::<LevelId>().is_err());
        assert_eq!(LevelId::Auto.to_string(), "-1");
        assert_eq!(serde_json::to_string(&LevelId::Index(2)).unwrap(), "\"2\"");
    }
}
