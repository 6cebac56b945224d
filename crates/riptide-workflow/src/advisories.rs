//! Advisories workflow - dumps what every detector can report

use riptide_core::{Result, Vulnerability};
use riptide_plugin::PluginManager;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

pub struct AdvisoriesWorkflow {
    plugin_manager: Arc<PluginManager>,
}

impl AdvisoriesWorkflow {
    pub fn new(plugin_manager: Arc<PluginManager>) -> Self {
        Self { plugin_manager }
    }

    /// Advisories of every registered detector, ignoring detector selection
    pub fn advisories(&self) -> Vec<Vulnerability> {
        self.plugin_manager
            .all_vuln_detectors()
            .iter()
            .flat_map(|detector| detector.advisories())
            .collect()
    }

    /// Write all advisories to `path` as a pretty-printed JSON array
    pub fn run(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let advisories = self.advisories();
        let json = serde_json::to_string_pretty(&advisories)?;

        if let Err(e) = std::fs::write(path, json) {
            error!(path = %path.display(), error = %e, "Failed to write advisories");
            return Err(e.into());
        }
        info!(path = %path.display(), count = advisories.len(), "Advisories written");
        Ok(())
    }
}
