//! Host environment boundary
//!
//! The core never touches the DOM, timers or SDK globals directly. Everything
//! it needs from the page is reached through the traits in this module, which
//! `marquee-wasm` implements over `web-sys` and [`crate::headless`] implements
//! in memory.

use crate::event::MediaEvent;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::rc::Rc;
use std::time::Duration;

/// Handle for a listener registered on the element or the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Handle for a repeating timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Listener invoked with each event of the type it was registered for
pub type Listener = Rc<dyn Fn(&MediaEvent)>;

/// Answer of `HTMLMediaElement.canPlayType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanPlay {
    No,
    Maybe,
    Probably,
}

impl CanPlay {
    /// Parse the DOM string answer (`""`, `"maybe"`, `"probably"`)
    pub fn from_dom(answer: &str) -> Self {
        match answer {
            "probably" => CanPlay::Probably,
            "maybe" => CanPlay::Maybe,
            _ => CanPlay::No,
        }
    }

    pub fn is_playable(&self) -> bool {
        !matches!(self, CanPlay::No)
    }
}

/// Rendered size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// The shared `<video>`/`<audio>` node.
///
/// Borrowed from the host for the lifetime of a session; adapters hold an
/// `Rc` to it but never own the underlying node.
pub trait MediaElement {
    /// Register a listener for one event type
    fn add_listener(&self, event: &str, listener: Listener) -> ListenerId;

    /// Remove a listener previously returned by [`MediaElement::add_listener`]
    fn remove_listener(&self, id: ListenerId);

    /// Synchronously dispatch a canonical event to the element's listeners
    fn dispatch(&self, event: MediaEvent);

    fn src(&self) -> String;
    fn set_src(&self, src: &str);
    fn load(&self);
    fn play(&self);
    fn pause(&self);
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);

    fn can_play_type(&self, mime: &str) -> CanPlay;

    /// Message of the element's current `MediaError`, if any
    fn error_message(&self) -> Option<String>;

    /// Rendered size of the element itself
    fn size(&self) -> Size;

    /// Rendered size of the element's parent node
    fn container_size(&self) -> Size;

    /// Toggle a marker class on the element
    fn set_class(&self, class: &str, enabled: bool);

    /// Insert an overlay container right after the element
    fn create_overlay(&self, id: &str) -> Box<dyn OverlayContainer>;
}

/// A container inserted next to the media element (ad rendering surface)
pub trait OverlayContainer {
    fn id(&self) -> &str;

    /// Detach the container from the document
    fn remove(&self);

    /// Platform SDK bindings downcast to reach the native node
    fn as_any(&self) -> &dyn Any;
}

/// Static environment flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Media Source Extensions available (required by streaming engines)
    pub media_source_extensions: bool,
    pub is_ios: bool,
    pub is_android: bool,
    pub is_safari: bool,
    pub is_chrome: bool,
}

impl Capabilities {
    /// Whether an ad may start without a user gesture
    pub fn ad_autoplay_allowed(&self) -> bool {
        !(self.is_android || self.is_ios)
    }

    /// Whether ads must start muted
    pub fn ad_play_muted(&self) -> bool {
        self.is_ios && (self.is_safari || self.is_chrome)
    }
}

/// Page-level services: timers, window resize, capability flags
pub trait HostEnv {
    fn set_interval(&self, period: Duration, tick: Rc<dyn Fn()>) -> TimerId;
    fn clear_interval(&self, id: TimerId);
    fn on_resize(&self, listener: Rc<dyn Fn()>) -> ListenerId;
    fn off_resize(&self, id: ListenerId);
    fn capabilities(&self) -> Capabilities;
}
