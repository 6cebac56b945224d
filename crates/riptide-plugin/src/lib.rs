//! Riptide Plugin - How plugins are described, selected and run
//!
//! - `PluginDefinition`: identity and matching metadata of a plugin
//! - `PluginRegistry`: registration-ordered plugin factories, built once at startup
//! - `PluginManager`: selects the plugins that apply to a target's services
//! - `PluginExecutor`: runs one plugin on the shared worker pool, turning every
//!   outcome into a `PluginExecutionResult`

pub mod definition;
pub mod executor;
pub mod manager;
pub mod plugin;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use definition::{PluginDefinition, PluginInfo, PluginType, TargetOperatingSystemClass};
pub use executor::{
    ExecutionStatus, PluginExecutionContext, PluginExecutionPool, PluginExecutionResult,
    PluginExecutor, PluginExecutorConfig,
};
pub use manager::{PluginManager, PluginMatchingResult};
pub use plugin::{
    MatchedPlugin, Plugin, PortScanner, RemoteVulnDetector, ServiceFingerprinter, VulnDetector,
};
pub use registry::PluginRegistry;
