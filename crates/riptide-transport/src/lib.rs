//! Riptide Transport - Talking to out-of-process plugin servers
//!
//! This crate provides:
//! - Wire messages of the language server protocol (health check, plugin listing, run)
//! - `PluginService`, the RPC seam, and its HTTP/JSON implementation
//! - `RemoteVulnDetectorImpl`, a `VulnDetector` that forwards work to a language server
//! - Registration and launching of configured language servers

pub mod client;
pub mod loader;
pub mod remote;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{HttpPluginService, PluginService, TransportError};
pub use loader::{register_language_servers, LanguageServerLauncher};
pub use remote::{BackoffPolicy, RemoteVulnDetectorImpl};
pub use types::*;
