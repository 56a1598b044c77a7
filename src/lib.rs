//! remote-lens: session root discovery and live camera projection for a remote process
//!
//! This library reads another process's memory to find the root object of its
//! current session and to keep a copy of its active camera's view transform, so
//! that world positions can be projected to screen coordinates.
//!
//! # Architecture
//!
//! - **Platform Layer**: Abstracts remote memory reads (single and scatter)
//! - **Scatter Pipeline**: Strictly ordered rounds of batched reads
//! - **Locator**: Races walk strategies over the live node list
//! - **Metadata**: Alternate route to the root through the runtime type table
//! - **Camera**: Default/optic camera selection and the lock-free live view
//! - **Projection**: World-to-screen transform with scope correction
//! - **Session**: Wires the above to session start/end signals

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Camera selection and the live view
pub mod camera;
/// Aggregated configuration
pub mod config;
/// Session root search over the node list
pub mod locator;
/// Small vector types
pub mod math;
/// Session root search through the type table
pub mod metadata;
/// Remote memory access
pub mod platform;
/// World-to-screen projection
pub mod projection;
/// Batched remote reads
pub mod scatter;
/// Session lifecycle
pub mod session;
/// Cancellation and logging helpers
pub mod utils;

// Re-export commonly used types
pub use camera::{AimState, CameraList, CameraResolver, LiveView};
pub use config::SessionConfig;
pub use locator::{GraphLocator, ListBounds, LocateResult};
pub use math::{Vec2, Vec3};
pub use metadata::{TypeTable, TypeTableResolver};
pub use platform::{MemoryReader, PlatformError};
pub use projection::{ProjectionResult, Projector, ViewTransform, Viewport};
pub use scatter::ScatterPipeline;
pub use session::{SessionContext, SessionRoots};
pub use utils::CancellationToken;

/// Result type used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for remote-lens
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(#[from] platform::PlatformError),

    /// Nothing matched
    #[error("Not found: {0}")]
    NotFound(String),

    /// More than one candidate matched where exactly one was expected
    #[error("Ambiguous match for {name}: {count} candidates")]
    Ambiguous {
        /// What was being resolved
        name: String,
        /// Number of distinct matches
        count: usize,
    },

    /// The caller's cancellation scope ended the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The main camera is missing from the camera list
    #[error("Default camera '{0}' not found")]
    NoDefaultCamera(String),

    /// A per-session operation ran before the session started
    #[error("Session not started")]
    SessionNotStarted,

    /// Configuration could not be parsed or serialized
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration parsed but holds unusable values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging for the library
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("remote_lens=info"))
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}
