//! Plugin traits - the interfaces every scanning plugin implements

use crate::definition::PluginDefinition;
use riptide_core::{
    DetectionReportList, FingerprintingReport, NetworkService, PortScanningReport, Result,
    ScanTarget, TargetInfo, Vulnerability,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Discovers the services exposed by a target. Runs once per scan.
#[async_trait::async_trait]
pub trait PortScanner: Send + Sync {
    async fn scan(&self, target: &ScanTarget) -> Result<PortScanningReport>;
}

/// Identifies a single service more precisely
#[async_trait::async_trait]
pub trait ServiceFingerprinter: Send + Sync {
    async fn fingerprint(
        &self,
        target_info: &TargetInfo,
        network_service: &NetworkService,
    ) -> Result<FingerprintingReport>;
}

/// Checks matched services for vulnerabilities
#[async_trait::async_trait]
pub trait VulnDetector: Send + Sync {
    async fn detect(
        &self,
        target_info: &TargetInfo,
        matched_services: &[NetworkService],
    ) -> Result<DetectionReportList>;

    /// Advisories this detector can report
    fn advisories(&self) -> Vec<Vulnerability> {
        Vec::new()
    }
}

/// A plugin hosted by a language server and the services it should run against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPlugin {
    pub plugin: PluginDefinition,
    #[serde(default)]
    pub services: Vec<NetworkService>,
}

/// A `VulnDetector` that forwards work to a language server
#[async_trait::async_trait]
pub trait RemoteVulnDetector: VulnDetector {
    /// Definitions of every plugin the server hosts
    async fn get_all_plugins(&self) -> Result<Vec<PluginDefinition>>;

    /// Queue a remote plugin for the next `detect` call. Duplicates are ignored.
    async fn add_matched_plugin_to_detect(&self, plugin: MatchedPlugin);

    fn as_vuln_detector(self: Arc<Self>) -> Arc<dyn VulnDetector>;
}

/// A live plugin instance, tagged by role
#[derive(Clone)]
pub enum Plugin {
    PortScanner(Arc<dyn PortScanner>),
    ServiceFingerprinter(Arc<dyn ServiceFingerprinter>),
    VulnDetector(Arc<dyn VulnDetector>),
    RemoteVulnDetector(Arc<dyn RemoteVulnDetector>),
}

impl Plugin {
    pub fn kind(&self) -> &'static str {
        match self {
            Plugin::PortScanner(_) => "PortScanner",
            Plugin::ServiceFingerprinter(_) => "ServiceFingerprinter",
            Plugin::VulnDetector(_) => "VulnDetector",
            Plugin::RemoteVulnDetector(_) => "RemoteVulnDetector",
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Plugin::{}", self.kind())
    }
}
