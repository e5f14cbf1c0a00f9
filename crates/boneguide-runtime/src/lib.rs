//! `boneguide-runtime` – the pose-tracking session engine.
//!
//! - [`session`] – [`TrackingSession`] and its phase transition table.
//! - [`scheduler`] – the cancellable, session-bound tracking loop.
//! - [`engine`] – [`Engine`], the handle to the coordinator task that owns
//!   the session and applies every change to it.
//! - [`scene`] – the [`SceneHost`] trait implemented by the host application.
//! - [`telemetry`] – [`init_tracing`] for binaries.

pub mod config;
pub mod engine;
pub mod error;
pub mod scene;
pub mod scheduler;
pub mod session;
pub mod telemetry;

pub use config::{DEFAULT_SERVER_URL, EngineConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use scene::SceneHost;
pub use scheduler::{LoopExit, PoseUpdate};
pub use session::{TrackingSession, Trigger};
pub use telemetry::{TracerProviderGuard, init_tracing};
