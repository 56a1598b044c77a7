//! Utility types shared by the locator and camera subsystems

/// Cancellation scopes and interruptible waits
pub mod cancel;

/// Log-once gate for repeated error categories
pub mod once_log;

pub use cancel::{wait_cancelled, CancellationToken};
pub use once_log::OnceLog;
