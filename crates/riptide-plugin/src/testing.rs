//! Fake plugins for tests

use crate::definition::{PluginDefinition, PluginType};
use crate::plugin::{
    MatchedPlugin, PortScanner, RemoteVulnDetector, ServiceFingerprinter, VulnDetector,
};
use chrono::Utc;
use riptide_core::{
    DetectionReport, DetectionReportList, DetectionStatus, Error, FingerprintingReport,
    NetworkEndpoint, NetworkService, PortScanningReport, Result, ScanTarget, Severity, Software,
    TargetInfo, TransportProtocol, Vulnerability, VulnerabilityId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Definition with author `test` and version `1.0`
pub fn definition(plugin_type: PluginType, name: &str) -> PluginDefinition {
    PluginDefinition::builder(plugin_type, name, "test", "1.0").build()
}

/// TCP service on 127.0.0.1
pub fn service(name: &str, port: u16) -> NetworkService {
    NetworkService::new(
        NetworkEndpoint::ip([127, 0, 0, 1].into()).with_port(port),
        TransportProtocol::Tcp,
        name,
    )
}

pub fn fake_vulnerability(name: &str) -> Vulnerability {
    Vulnerability::new(
        VulnerabilityId::new("RIPTIDE", name),
        format!("Fake vulnerability {}", name),
        Severity::High,
    )
}

pub fn detection_report(
    target_info: &TargetInfo,
    network_service: &NetworkService,
    status: DetectionStatus,
    vulnerability: Vulnerability,
) -> DetectionReport {
    DetectionReport {
        target_info: target_info.clone(),
        network_service: network_service.clone(),
        detection_timestamp: Utc::now(),
        detection_status: status,
        vulnerability,
    }
}

/// Reports a fixed list of services
#[derive(Debug, Clone, Default)]
pub struct FakePortScanner {
    services: Vec<NetworkService>,
}

impl FakePortScanner {
    pub fn new(services: Vec<NetworkService>) -> Self {
        Self { services }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PortScanner for FakePortScanner {
    async fn scan(&self, target: &ScanTarget) -> Result<PortScanningReport> {
        Ok(PortScanningReport {
            target_info: TargetInfo::new(vec![target.network_endpoint.clone()]),
            network_services: self.services.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailingPortScanner;

#[async_trait::async_trait]
impl PortScanner for FailingPortScanner {
    async fn scan(&self, _target: &ScanTarget) -> Result<PortScanningReport> {
        Err(Error::Internal(String::from("port scanner crashed")))
    }
}

/// Tags every fingerprinted service with a software name
#[derive(Debug, Clone)]
pub struct FakeServiceFingerprinter {
    software_name: String,
}

impl FakeServiceFingerprinter {
    pub fn new(software_name: &str) -> Self {
        Self {
            software_name: software_name.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ServiceFingerprinter for FakeServiceFingerprinter {
    async fn fingerprint(
        &self,
        _target_info: &TargetInfo,
        network_service: &NetworkService,
    ) -> Result<FingerprintingReport> {
        Ok(FingerprintingReport {
            network_services: vec![network_service
                .clone()
                .with_software(Software::new(&self.software_name))],
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailingServiceFingerprinter;

#[async_trait::async_trait]
impl ServiceFingerprinter for FailingServiceFingerprinter {
    async fn fingerprint(
        &self,
        _target_info: &TargetInfo,
        _network_service: &NetworkService,
    ) -> Result<FingerprintingReport> {
        Err(Error::Internal(String::from("fingerprinter crashed")))
    }
}

/// Reports one vulnerability with a fixed status on every matched service
#[derive(Debug, Clone)]
pub struct FakeVulnDetector {
    status: DetectionStatus,
    vulnerability: Vulnerability,
    single_report: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeVulnDetector {
    pub fn new(status: DetectionStatus) -> Self {
        Self::with_vulnerability(status, fake_vulnerability("FAKE_VULN"))
    }

    pub fn with_vulnerability(status: DetectionStatus, vulnerability: Vulnerability) -> Self {
        Self {
            status,
            vulnerability,
            single_report: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report only on the first matched service
    pub fn single_report(status: DetectionStatus) -> Self {
        Self {
            single_report: true,
            ..Self::new(status)
        }
    }

    /// Number of `detect` calls across all clones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VulnDetector for FakeVulnDetector {
    async fn detect(
        &self,
        target_info: &TargetInfo,
        matched_services: &[NetworkService],
    ) -> Result<DetectionReportList> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reported = if self.single_report {
            &matched_services[..matched_services.len().min(1)]
        } else {
            matched_services
        };
        Ok(reported
            .iter()
            .map(|s| detection_report(target_info, s, self.status, self.vulnerability.clone()))
            .collect::<Vec<_>>()
            .into())
    }

    fn advisories(&self) -> Vec<Vulnerability> {
        vec![self.vulnerability.clone()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailingVulnDetector;

#[async_trait::async_trait]
impl VulnDetector for FailingVulnDetector {
    async fn detect(
        &self,
        _target_info: &TargetInfo,
        _matched_services: &[NetworkService],
    ) -> Result<DetectionReportList> {
        Err(Error::Internal(String::from("detector crashed")))
    }
}

/// Sleeps before returning no reports
#[derive(Debug, Clone)]
pub struct SlowVulnDetector {
    delay: Duration,
}

impl SlowVulnDetector {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl VulnDetector for SlowVulnDetector {
    async fn detect(
        &self,
        _target_info: &TargetInfo,
        _matched_services: &[NetworkService],
    ) -> Result<DetectionReportList> {
        tokio::time::sleep(self.delay).await;
        Ok(DetectionReportList::empty())
    }
}

/// Remote detector hosting a fixed plugin list. Clones share the queued plugins.
#[derive(Debug, Clone)]
pub struct FakeRemoteVulnDetector {
    plugins: Option<Vec<PluginDefinition>>,
    queued: Arc<Mutex<Vec<MatchedPlugin>>>,
}

impl FakeRemoteVulnDetector {
    pub fn new(plugins: Vec<PluginDefinition>) -> Self {
        Self {
            plugins: Some(plugins),
            queued: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A detector whose every call fails like an unreachable language server
    pub fn unreachable() -> Self {
        Self {
            plugins: None,
            queued: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn queued(&self) -> Arc<Mutex<Vec<MatchedPlugin>>> {
        Arc::clone(&self.queued)
    }

    fn unreachable_error() -> Error {
        Error::language_server("Failed to get response from language server.")
    }
}

#[async_trait::async_trait]
impl VulnDetector for FakeRemoteVulnDetector {
    async fn detect(
        &self,
        _target_info: &TargetInfo,
        _matched_services: &[NetworkService],
    ) -> Result<DetectionReportList> {
        match self.plugins {
            Some(_) => Ok(DetectionReportList::empty()),
            None => Err(Self::unreachable_error()),
        }
    }
}

#[async_trait::async_trait]
impl RemoteVulnDetector for FakeRemoteVulnDetector {
    async fn get_all_plugins(&self) -> Result<Vec<PluginDefinition>> {
        self.plugins.clone().ok_or_else(Self::unreachable_error)
    }

    async fn add_matched_plugin_to_detect(&self, plugin: MatchedPlugin) {
        let mut queued = self.queued.lock().await;
        if !queued.contains(&plugin) {
            queued.push(plugin);
        }
    }

    fn as_vuln_detector(self: Arc<Self>) -> Arc<dyn VulnDetector> {
        self
    }
}
