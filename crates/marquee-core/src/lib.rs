//! Marquee Core - Backend-switching and event-normalization layer
//!
//! This crate provides the playback abstraction behind the Marquee player:
//! - Backend selection over priority-ordered adapter factories
//! - Native HTML5 and MPEG-DASH adapters with one capability set
//! - Normalization of backend events into one canonical vocabulary
//! - An ad overlay that suspends and resumes content around ad breaks
//! - A session facade that forwards every call to the active backend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Marquee Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │                    ┌─────────────┐     ┌──────────────┐         │
//! │                    │   Session   │────▶│   Session    │         │
//! │                    │   Facade    │     │   Registry   │         │
//! │                    └──────┬──────┘     └──────────────┘         │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Backend   │                              │
//! │                    │  Selector   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │         ┌─────────────────┼─────────────────┐                   │
//! │  ┌──────┴───────┐  ┌──────┴───────┐  ┌──────┴───────┐           │
//! │  │    Native    │  │     DASH     │  │  Ad Overlay  │           │
//! │  │   Adapter    │  │   Adapter    │  │ (wraps one)  │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         └─────────────────┼─────────────────┘                   │
//! │                    ┌──────┴──────┐                              │
//! │                    │    Event    │──▶ shared media element      │
//! │                    │ Normalizer  │                              │
//! │                    └─────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The DOM, timers and third-party SDKs are reached through the traits in
//! [`host`], [`adapter`] and [`ads`]. `marquee-wasm` implements them for the
//! browser; the `headless` module (behind the `headless` feature) implements
//! them in memory.

pub mod adapter;
pub mod ads;
pub mod config;
pub mod error;
pub mod event;
#[cfg(any(test, feature = "headless"))]
pub mod headless;
pub mod host;
pub mod normalizer;
pub mod registry;
pub mod sdk;
pub mod selector;
pub mod session;
pub mod signal;
pub mod source;
pub mod subscription;

pub use adapter::{AdapterFactory, DashAdapter, DashFactory, MediaAdapter, NativeAdapter, NativeFactory};
pub use ads::{AdBackend, AdError, AdOverlay, AdPhase};
pub use config::{AdsConfig, LogLevel, PlayerConfig, StreamingConfig};
pub use error::{Error, Result};
pub use event::{BackendEvent, BackendFamily, EventDetail, EventType, MediaEvent};
pub use host::{Capabilities, HostEnv, MediaElement};
pub use normalizer::EventNormalizer;
pub use registry::SessionRegistry;
pub use sdk::{resolve_capability, ScriptLoader};
pub use selector::{BackendSelector, Selection};
pub use session::{Session, SessionBuilder, SessionId};
pub use signal::{completion, Completer, Completion};
pub use source::{predict_type, LevelId, QualityLevel, Source};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
pub fn init() {
    tracing::info!(version = VERSION, "Marquee Core initialized");
}
