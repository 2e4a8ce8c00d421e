//! Backend adapters
//!
//! Each adapter wraps one playback technology behind [`MediaAdapter`]:
//! - [`NativeAdapter`]: the element's own decoder
//! - [`DashAdapter`]: an MSE streaming engine driven through [`StreamingEngine`]
//!
//! Adapters take `&self` everywhere. Host listeners may call back into the
//! session while an adapter call is dispatching, so adapters keep their state
//! behind short-lived interior borrows.

mod dash;
mod engine;
mod native;

pub use dash::{DashAdapter, DashFactory, STREAM_ACTIVATED};
pub use engine::{BitrateInfo, EngineHandler, StreamingEngine, StreamingEngineFactory, TrackKind};
pub use native::{NativeAdapter, NativeFactory};

use crate::event::BackendFamily;
use crate::host::MediaElement;
use crate::signal::Completion;
use crate::source::{LevelId, QualityLevel, Source};
use std::rc::Rc;

/// Uniform playback capability set
pub trait MediaAdapter {
    fn family(&self) -> BackendFamily;

    /// Pure predicate over the MIME type and static environment flags
    fn can_play_type(&self, mime: &str) -> bool;

    /// Bind the engine to the element. Idempotent per instance.
    fn load(&self);

    fn source(&self) -> Source;

    /// Replace the source in place.
    ///
    /// Returns `false` when this adapter cannot take the new source; the
    /// caller then builds a fresh adapter instead.
    fn set_source(&self, source: Source) -> bool;

    fn play(&self);
    fn pause(&self);
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;

    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);

    /// Current bitrate ladder, recomputed on every call
    fn levels(&self) -> Vec<QualityLevel>;
    fn level(&self) -> LevelId;

    /// `LevelId::Auto` re-enables automatic switching; an index pins that level
    fn set_level(&self, level: LevelId);

    /// Resolves once the backend can report duration and levels
    fn ready(&self) -> Completion {
        Completion::resolved()
    }

    /// Live subscriptions this instance created (element and engine)
    fn subscription_count(&self) -> usize;

    /// Unregister every subscription and release the engine.
    /// Safe to call before `load()` and more than once.
    fn destroy(&self);
}

/// Builds one kind of adapter; consulted by the backend selector
pub trait AdapterFactory {
    fn family(&self) -> BackendFamily;

    /// Same predicate the built adapter answers with
    fn can_play_type(&self, element: &dyn MediaElement, mime: &str) -> bool;

    fn create(&self, element: Rc<dyn MediaElement>, source: Source) -> Rc<dyn MediaAdapter>;
}
