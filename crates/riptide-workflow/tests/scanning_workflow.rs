//! End-to-end runs of the scanning workflow over fake plugins

use chrono::{TimeZone, Utc};
use riptide_common::FakeUtcClock;
use riptide_core::{
    DetectionReportList, DetectionStatus, FingerprintingReport, NetworkService,
    PortScanningReport, ScanStatus, ScanTarget, Software, TargetInfo,
};
use riptide_plugin::testing::{
    definition, detection_report, fake_vulnerability, service, FailingPortScanner,
    FailingServiceFingerprinter, FailingVulnDetector, FakePortScanner, FakeRemoteVulnDetector,
    FakeServiceFingerprinter, FakeVulnDetector, SlowVulnDetector,
};
use riptide_plugin::{
    MatchedPlugin, PluginDefinition, PluginExecutionPool, PluginExecutor, PluginManager,
    PluginRegistry, PluginType, PortScanner, RemoteVulnDetector, ServiceFingerprinter,
    VulnDetector,
};
use riptide_transport::testing::ScriptedPluginService;
use riptide_transport::{PluginService, RemoteVulnDetectorImpl};
use riptide_workflow::{DefaultScanningWorkflow, ExecutionStage};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn target() -> ScanTarget {
    ScanTarget::parse("127.0.0.1").unwrap()
}

fn two_services() -> Vec<NetworkService> {
    vec![service("ssh", 22), service("http", 80)]
}

fn port_scan_definition() -> PluginDefinition {
    definition(PluginType::PortScan, "FakePortScanner")
}

fn detector_definition(name: &str) -> PluginDefinition {
    definition(PluginType::VulnDetection, name)
}

fn workflow(registry: PluginRegistry) -> DefaultScanningWorkflow {
    workflow_with_executor(registry, PluginExecutor::new(PluginExecutionPool::new(4)))
}

fn workflow_with_executor(
    registry: PluginRegistry,
    executor: PluginExecutor,
) -> DefaultScanningWorkflow {
    let manager = PluginManager::new(Arc::new(registry));
    DefaultScanningWorkflow::new(Arc::new(manager), executor)
}

fn registry_with_services(services: Vec<NetworkService>) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register_port_scanner(port_scan_definition(), move || {
        FakePortScanner::new(services.clone())
    });
    registry
}

#[tokio::test]
async fn test_no_port_scanner_fails_scan() {
    let mut workflow = workflow(PluginRegistry::new());

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Failed);
    assert_eq!(
        results.status_message,
        "At least one PortScanner plugin is required"
    );
    assert!(results.scan_findings.is_empty());
    assert!(workflow.execution_tracer().unwrap().is_done());
}

#[tokio::test]
async fn test_single_detector_verified_finding() {
    let mut registry = registry_with_services(two_services());
    let detector = FakeVulnDetector::new(DetectionStatus::VulnerabilityVerified);
    let counter = detector.clone();
    registry.register_vuln_detector(detector_definition("Detector"), move || detector.clone());
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    // One report per matched service; both services match an unfiltered detector.
    assert_eq!(results.scan_status, ScanStatus::Succeeded);
    assert!(results.status_message.is_empty());
    assert_eq!(results.scan_findings.len(), 2);
    assert_eq!(results.full_detection_reports.len(), 2);
    assert_eq!(counter.calls(), 1);

    let recon = results.reconnaissance_report.unwrap();
    assert_eq!(recon.network_services, two_services());
}

#[tokio::test]
async fn test_one_finding_when_detector_targets_one_service() {
    let mut registry = registry_with_services(two_services());
    registry.register_vuln_detector(
        PluginDefinition::builder(PluginType::VulnDetection, "SshDetector", "test", "1.0")
            .target_service_names(["ssh"])
            .build(),
        || FakeVulnDetector::new(DetectionStatus::VulnerabilityVerified),
    );
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Succeeded);
    assert_eq!(results.scan_findings.len(), 1);
    assert_eq!(results.scan_findings[0].network_service, service("ssh", 22));
}

#[tokio::test]
async fn test_one_failing_detector_partially_succeeds() {
    let mut registry = registry_with_services(two_services());
    registry.register_vuln_detector(detector_definition("Good"), || {
        FakeVulnDetector::new(DetectionStatus::VulnerabilityVerified)
    });
    registry.register_vuln_detector(detector_definition("Broken"), || FailingVulnDetector);
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::PartiallySucceeded);
    assert!(results.status_message.starts_with("Failed plugins:\n"));
    assert!(results
        .status_message
        .contains(&detector_definition("Broken").id()));
    assert!(!results
        .status_message
        .contains(&detector_definition("Good").id()));
    assert_eq!(results.scan_findings.len(), 2);
}

#[tokio::test]
async fn test_all_detectors_failing_fails_scan() {
    let mut registry = registry_with_services(two_services());
    registry.register_vuln_detector(detector_definition("BrokenOne"), || FailingVulnDetector);
    registry.register_vuln_detector(detector_definition("BrokenTwo"), || FailingVulnDetector);
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Failed);
    assert_eq!(results.status_message, "All VulnDetectors failed.");
    assert!(results.scan_findings.is_empty());
    assert!(results.reconnaissance_report.is_some());
}

#[tokio::test]
async fn test_no_matching_detectors_succeeds_without_findings() {
    let mut workflow = workflow(registry_with_services(Vec::new()));
    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Succeeded);
    assert!(results.scan_findings.is_empty());
}

#[tokio::test]
async fn test_failing_port_scanner_aborts_scan() {
    let mut registry = PluginRegistry::new();
    registry.register_port_scanner(port_scan_definition(), || FailingPortScanner);
    registry.register_vuln_detector(detector_definition("Detector"), || {
        FakeVulnDetector::new(DetectionStatus::VulnerabilityVerified)
    });
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Failed);
    assert_eq!(
        results.status_message,
        format!("Plugin execution error on '{}'.", port_scan_definition().id())
    );
    let tracer = workflow.execution_tracer().unwrap();
    assert_eq!(tracer.current_stage(), ExecutionStage::Done);
    assert!(tracer.selected_vuln_detectors().is_empty());
}

#[tokio::test]
async fn test_fingerprinting_keeps_unmatched_and_failed_services() {
    let services = vec![service("ssh", 22), service("http", 80), service("https", 443)];
    let mut registry = registry_with_services(services);
    registry.register_service_fingerprinter(
        PluginDefinition::builder(PluginType::ServiceFingerprint, "SshFp", "test", "1.0")
            .target_service_names(["ssh"])
            .build(),
        || FailingServiceFingerprinter,
    );
    registry.register_service_fingerprinter(
        PluginDefinition::builder(PluginType::ServiceFingerprint, "HttpFp", "test", "1.0")
            .target_service_names(["http"])
            .build(),
        || FakeServiceFingerprinter::new("nginx"),
    );
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    let recon = results.reconnaissance_report.unwrap();
    let names: Vec<&str> = recon
        .network_services
        .iter()
        .map(|s| s.service_name.as_str())
        .collect();
    // Unfingerprinted services first, then fingerprinting output in scan order.
    assert_eq!(names, vec!["https", "ssh", "http"]);
    assert!(recon.network_services[1].software.is_none());
    assert_eq!(recon.network_services[2].software_name(), "nginx");

    let tracer = workflow.execution_tracer().unwrap();
    assert_eq!(tracer.selected_service_fingerprinters().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_detector_partially_succeeds() {
    let mut registry = registry_with_services(two_services());
    registry.register_vuln_detector(detector_definition("Fast"), || {
        FakeVulnDetector::new(DetectionStatus::VulnerabilityPresent)
    });
    registry.register_vuln_detector(detector_definition("Slow"), || {
        SlowVulnDetector::new(Duration::from_secs(600))
    });
    let executor =
        PluginExecutor::new(PluginExecutionPool::new(4)).with_deadline(Duration::from_secs(5));
    let mut workflow = workflow_with_executor(registry, executor);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::PartiallySucceeded);
    assert!(results
        .status_message
        .contains(&detector_definition("Slow").id()));
    assert_eq!(results.scan_findings.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_fails_scan() {
    let mut registry = registry_with_services(two_services());
    registry.register_vuln_detector(detector_definition("Slow"), || {
        SlowVulnDetector::new(Duration::from_secs(3600))
    });
    let mut workflow = workflow(registry);
    let token = workflow.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Failed);
    assert!(results.status_message.contains("cancelled"));
    assert!(workflow.execution_tracer().unwrap().is_done());
}

struct ClockAdvancingPortScanner {
    clock: Arc<FakeUtcClock>,
}

#[async_trait::async_trait]
impl PortScanner for ClockAdvancingPortScanner {
    async fn scan(&self, target: &ScanTarget) -> riptide_core::Result<PortScanningReport> {
        self.clock.advance(Duration::from_secs(42));
        Ok(PortScanningReport {
            target_info: TargetInfo::new(vec![target.network_endpoint.clone()]),
            network_services: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_scan_timestamps_come_from_clock() {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(FakeUtcClock::new(start));
    let scanner_clock = Arc::clone(&clock);
    let mut registry = PluginRegistry::new();
    registry.register_port_scanner(port_scan_definition(), move || ClockAdvancingPortScanner {
        clock: Arc::clone(&scanner_clock),
    });
    let mut workflow = workflow(registry).with_clock(clock);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_start_timestamp, start);
    assert_eq!(results.scan_duration, Duration::from_secs(42));
}

#[tokio::test]
async fn test_tracer_records_every_phase() {
    let mut registry = registry_with_services(two_services());
    registry.register_vuln_detector(detector_definition("Detector"), || {
        FakeVulnDetector::new(DetectionStatus::Safe)
    });
    let mut workflow = workflow(registry);
    assert!(workflow.execution_tracer().is_none());

    let results = workflow.run_async(&target()).await;

    let tracer = workflow.execution_tracer().unwrap();
    assert!(tracer.is_done());
    assert_eq!(tracer.selected_port_scanners().len(), 1);
    assert!(tracer.selected_service_fingerprinters().is_empty());
    assert_eq!(
        tracer.selected_vuln_detectors()[0].matched_services,
        two_services()
    );
    let trace = tracer.build_loggable_execution_trace(&results);
    assert!(trace.ends_with("# of detected vulnerability: 0."));
}

#[tokio::test]
async fn test_remote_detector_queues_matched_plugins() {
    let mut registry = registry_with_services(two_services());
    let remote = FakeRemoteVulnDetector::new(vec![PluginDefinition::builder(
        PluginType::VulnDetection,
        "RemoteHttp",
        "remote",
        "1.0",
    )
    .target_service_names(["http"])
    .build()]);
    let queued = remote.queued();
    registry.register_remote_vuln_detector(
        definition(PluginType::RemoteVulnDetection, "Remote"),
        move || remote.clone(),
    );
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Succeeded);
    let queued = queued.lock().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].services, vec![service("http", 80)]);
}

#[tokio::test]
async fn test_unreachable_remote_detector_is_reported() {
    let mut registry = registry_with_services(two_services());
    registry.register_remote_vuln_detector(
        definition(PluginType::RemoteVulnDetection, "Remote"),
        FakeRemoteVulnDetector::unreachable,
    );
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Failed);
    assert_eq!(results.status_message, "All VulnDetectors failed.");
}

#[tokio::test]
async fn test_not_serving_language_server_yields_no_reports() {
    let plugin_service = Arc::new(ScriptedPluginService::not_serving());
    let mut registry = registry_with_services(two_services());
    let factory_service = Arc::clone(&plugin_service);
    registry.register_remote_vuln_detector(
        definition(PluginType::RemoteVulnDetection, "Remote"),
        move || RemoteVulnDetectorImpl::new(Arc::clone(&factory_service) as Arc<dyn PluginService>),
    );
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Succeeded);
    assert!(results.full_detection_reports.is_empty());
    assert!(plugin_service.run_requests().await.is_empty());
}

#[tokio::test]
async fn test_language_server_reports_become_findings() {
    let target_info = TargetInfo::new(vec![target().network_endpoint]);
    let report = detection_report(
        &target_info,
        &service("http", 80),
        DetectionStatus::VulnerabilityVerified,
        fake_vulnerability("REMOTE_VULN"),
    );
    let plugin_service = Arc::new(
        ScriptedPluginService::serving()
            .with_plugins(vec![detector_definition("RemoteDetector")])
            .with_reports(DetectionReportList::new(vec![report])),
    );
    let mut registry = registry_with_services(two_services());
    let factory_service = Arc::clone(&plugin_service);
    registry.register_remote_vuln_detector(
        definition(PluginType::RemoteVulnDetection, "Remote"),
        move || RemoteVulnDetectorImpl::new(Arc::clone(&factory_service) as Arc<dyn PluginService>),
    );
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Succeeded);
    assert_eq!(results.scan_findings.len(), 1);
    assert_eq!(results.scan_findings[0].vulnerability.main_id.value, "REMOTE_VULN");

    let requests = plugin_service.run_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].plugins[0].services, two_services());
}

#[test]
fn test_blocking_run() {
    let mut registry = registry_with_services(two_services());
    registry.register_vuln_detector(detector_definition("Detector"), || {
        FakeVulnDetector::new(DetectionStatus::VulnerabilityVerified)
    });
    let mut workflow = workflow(registry);

    let results = workflow.run(&target()).unwrap();

    assert!(results.is_succeeded());
    assert_eq!(results.scan_findings.len(), 2);
}

#[tokio::test]
async fn test_detector_matching_both_services_with_one_finding() {
    let mut registry = registry_with_services(two_services());
    registry.register_vuln_detector(detector_definition("Detector"), || {
        FakeVulnDetector::single_report(DetectionStatus::VulnerabilityVerified)
    });
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Succeeded);
    assert_eq!(results.scan_findings.len(), 1);
    assert_eq!(
        workflow.execution_tracer().unwrap().selected_vuln_detectors()[0].matched_services,
        two_services()
    );
}

struct SlowPortScanner;

#[async_trait::async_trait]
impl PortScanner for SlowPortScanner {
    async fn scan(&self, target: &ScanTarget) -> riptide_core::Result<PortScanningReport> {
        tokio::time::sleep(Duration::from_secs(100)).await;
        Ok(PortScanningReport {
            target_info: TargetInfo::new(vec![target.network_endpoint.clone()]),
            network_services: two_services(),
        })
    }
}

fn cancel_after(token: CancellationToken, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_port_scanning() {
    let mut registry = PluginRegistry::new();
    registry.register_port_scanner(port_scan_definition(), || SlowPortScanner);
    let mut workflow = workflow(registry);
    cancel_after(workflow.cancellation_token(), Duration::from_secs(1));

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Failed);
    assert!(results.status_message.starts_with("Scan cancelled"));
    assert!(workflow.execution_tracer().unwrap().is_done());
}

/// Fingerprints a service after a delay chosen by its port
struct DelayedFingerprinter;

#[async_trait::async_trait]
impl ServiceFingerprinter for DelayedFingerprinter {
    async fn fingerprint(
        &self,
        _target_info: &TargetInfo,
        network_service: &NetworkService,
    ) -> riptide_core::Result<FingerprintingReport> {
        let delay = match network_service.port() {
            Some(22) => 30,
            Some(80) => 10,
            _ => 20,
        };
        tokio::time::sleep(Duration::from_secs(delay)).await;
        Ok(FingerprintingReport {
            network_services: vec![network_service
                .clone()
                .with_software(Software::new(format!("sw-{}", delay)))],
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_fingerprint_order_follows_scan_order() {
    let services = vec![service("ssh", 22), service("http", 80), service("ftp", 21)];
    let mut registry = registry_with_services(services);
    registry.register_service_fingerprinter(
        PluginDefinition::builder(PluginType::ServiceFingerprint, "Delayed", "test", "1.0")
            .target_service_names(["ssh", "http", "ftp"])
            .build(),
        || DelayedFingerprinter,
    );
    let mut workflow = workflow(registry);

    let results = workflow.run_async(&target()).await;

    let recon = results.reconnaissance_report.unwrap();
    let fingerprinted: Vec<(&str, &str)> = recon
        .network_services
        .iter()
        .map(|s| (s.service_name.as_str(), s.software_name()))
        .collect();
    assert_eq!(
        fingerprinted,
        vec![("ssh", "sw-30"), ("http", "sw-10"), ("ftp", "sw-20")]
    );
}

/// Remote detector whose plugin listing never answers
struct UnresponsiveRemoteVulnDetector;

#[async_trait::async_trait]
impl VulnDetector for UnresponsiveRemoteVulnDetector {
    async fn detect(
        &self,
        _target_info: &TargetInfo,
        _matched_services: &[NetworkService],
    ) -> riptide_core::Result<DetectionReportList> {
        Ok(DetectionReportList::empty())
    }
}

#[async_trait::async_trait]
impl RemoteVulnDetector for UnresponsiveRemoteVulnDetector {
    async fn get_all_plugins(&self) -> riptide_core::Result<Vec<PluginDefinition>> {
        std::future::pending().await
    }

    async fn add_matched_plugin_to_detect(&self, _plugin: MatchedPlugin) {}

    fn as_vuln_detector(self: Arc<Self>) -> Arc<dyn VulnDetector> {
        self
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_listing_remote_plugins() {
    let mut registry = registry_with_services(two_services());
    registry.register_remote_vuln_detector(
        definition(PluginType::RemoteVulnDetection, "Remote"),
        || UnresponsiveRemoteVulnDetector,
    );
    let mut workflow = workflow(registry);
    cancel_after(workflow.cancellation_token(), Duration::from_secs(5));

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Failed);
    assert!(results.status_message.starts_with("Scan cancelled"));
    let tracer = workflow.execution_tracer().unwrap();
    assert!(tracer.is_done());
    assert!(tracer.selected_vuln_detectors().is_empty());
}

/// Cancels the scan from inside a detector that has already produced its report
struct CancellingVulnDetector {
    token: CancellationToken,
}

#[async_trait::async_trait]
impl VulnDetector for CancellingVulnDetector {
    async fn detect(
        &self,
        target_info: &TargetInfo,
        matched_services: &[NetworkService],
    ) -> riptide_core::Result<DetectionReportList> {
        self.token.cancel();
        Ok(DetectionReportList::new(vec![detection_report(
            target_info,
            &matched_services[0],
            DetectionStatus::VulnerabilityVerified,
            fake_vulnerability("LATE"),
        )]))
    }
}

#[tokio::test]
async fn test_cancel_after_detection_keeps_results() {
    let mut registry = registry_with_services(two_services());
    let workflow_token: Arc<OnceLock<CancellationToken>> = Arc::default();
    let factory_token = Arc::clone(&workflow_token);
    registry.register_vuln_detector(detector_definition("Cancelling"), move || {
        CancellingVulnDetector {
            token: factory_token.get().cloned().unwrap_or_default(),
        }
    });
    let mut workflow = workflow(registry);
    workflow_token.set(workflow.cancellation_token()).unwrap();

    let results = workflow.run_async(&target()).await;

    assert_eq!(results.scan_status, ScanStatus::Succeeded);
    assert_eq!(results.scan_findings.len(), 1);
    assert!(workflow.cancellation_token().is_cancelled());
}
