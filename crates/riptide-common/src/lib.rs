//! Riptide Common - Shared utilities: logging, configuration, clocks
//!
//! This crate provides common functionality used across all Riptide crates.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{Config, ConfigBuilder, LanguageServerConfig};
pub use logging::init_logging;
pub use time::{Clock, FakeUtcClock, Stopwatch, SystemUtcClock};
