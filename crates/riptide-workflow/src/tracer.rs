//! Execution tracer - phase state machine and timing for one scan
//!
//! Transitions are strictly linear:
//! START → PORT_SCANNING → SERVICE_FINGERPRINTING → VULNERABILITY_DETECTING → DONE.
//! Calling a transition out of order is a bug in the caller and panics.

use riptide_common::Stopwatch;
use riptide_core::{NetworkService, ScanResults};
use riptide_plugin::PluginMatchingResult;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStage {
    Start,
    PortScanning,
    ServiceFingerprinting,
    VulnerabilityDetecting,
    Done,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::Start => "START",
            ExecutionStage::PortScanning => "PORT_SCANNING",
            ExecutionStage::ServiceFingerprinting => "SERVICE_FINGERPRINTING",
            ExecutionStage::VulnerabilityDetecting => "VULNERABILITY_DETECTING",
            ExecutionStage::Done => "DONE",
        }
    }
}

impl std::fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A plugin chosen for a phase and the services it was matched against
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedPlugin {
    pub plugin_id: String,
    pub matched_services: Vec<NetworkService>,
}

impl SelectedPlugin {
    pub fn from_matching_result<T: ?Sized>(result: &PluginMatchingResult<T>) -> Self {
        Self {
            plugin_id: result.plugin_id(),
            matched_services: result.matched_services.clone(),
        }
    }

    fn info_message(&self) -> String {
        if self.matched_services.is_empty() {
            return self.plugin_id.clone();
        }
        let services: Vec<String> = self.matched_services.iter().map(|s| s.to_string()).collect();
        format!(
            "{} was selected for the following services: {}",
            self.plugin_id,
            services.join(", ")
        )
    }
}

fn select<T: ?Sized>(selected: &[PluginMatchingResult<T>]) -> Vec<SelectedPlugin> {
    selected.iter().map(SelectedPlugin::from_matching_result).collect()
}

/// Tracks the phase of one workflow run. Never shared between scans.
#[derive(Debug, Clone)]
pub struct ExecutionTracer {
    current_stage: ExecutionStage,
    port_scanning_timer: Stopwatch,
    service_fingerprinting_timer: Stopwatch,
    vulnerability_detecting_timer: Stopwatch,
    selected_port_scanners: Vec<SelectedPlugin>,
    selected_service_fingerprinters: Vec<SelectedPlugin>,
    selected_vuln_detectors: Vec<SelectedPlugin>,
}

impl ExecutionTracer {
    pub fn start_workflow() -> Self {
        Self {
            current_stage: ExecutionStage::Start,
            port_scanning_timer: Stopwatch::new(),
            service_fingerprinting_timer: Stopwatch::new(),
            vulnerability_detecting_timer: Stopwatch::new(),
            selected_port_scanners: Vec::new(),
            selected_service_fingerprinters: Vec::new(),
            selected_vuln_detectors: Vec::new(),
        }
    }

    pub fn current_stage(&self) -> ExecutionStage {
        self.current_stage
    }

    fn check_stage(&self, expected: ExecutionStage) {
        assert_eq!(
            self.current_stage, expected,
            "illegal execution stage transition from {}",
            self.current_stage
        );
    }

    pub fn start_port_scanning<T: ?Sized>(&mut self, selected: &[PluginMatchingResult<T>]) {
        self.check_stage(ExecutionStage::Start);

        self.port_scanning_timer.start();
        self.current_stage = ExecutionStage::PortScanning;
        self.selected_port_scanners = select(selected);
    }

    pub fn start_service_fingerprinting<T: ?Sized>(&mut self, selected: &[PluginMatchingResult<T>]) {
        self.check_stage(ExecutionStage::PortScanning);
        assert!(self.port_scanning_timer.is_running());

        self.port_scanning_timer.stop();
        self.service_fingerprinting_timer.start();
        self.current_stage = ExecutionStage::ServiceFingerprinting;
        self.selected_service_fingerprinters = select(selected);
    }

    pub fn start_vulnerability_detecting<T: ?Sized>(&mut self, selected: &[PluginMatchingResult<T>]) {
        self.check_stage(ExecutionStage::ServiceFingerprinting);
        assert!(self.service_fingerprinting_timer.is_running());

        self.service_fingerprinting_timer.stop();
        self.vulnerability_detecting_timer.start();
        self.current_stage = ExecutionStage::VulnerabilityDetecting;
        self.selected_vuln_detectors = select(selected);
    }

    pub fn set_done(&mut self) {
        self.check_stage(ExecutionStage::VulnerabilityDetecting);
        assert!(!self.port_scanning_timer.is_running());
        assert!(!self.service_fingerprinting_timer.is_running());
        assert!(self.vulnerability_detecting_timer.is_running());

        self.vulnerability_detecting_timer.stop();
        self.current_stage = ExecutionStage::Done;
    }

    /// Stop whatever is running and move to DONE from any stage
    pub fn force_done(&mut self) {
        self.port_scanning_timer.stop();
        self.service_fingerprinting_timer.stop();
        self.vulnerability_detecting_timer.stop();
        self.current_stage = ExecutionStage::Done;
    }

    pub fn is_done(&self) -> bool {
        self.current_stage == ExecutionStage::Done
    }

    pub fn port_scanning_stage_runtime(&self) -> Duration {
        self.port_scanning_timer.elapsed()
    }

    pub fn service_fingerprinting_stage_runtime(&self) -> Duration {
        self.service_fingerprinting_timer.elapsed()
    }

    pub fn vulnerability_detecting_stage_runtime(&self) -> Duration {
        self.vulnerability_detecting_timer.elapsed()
    }

    pub fn selected_port_scanners(&self) -> &[SelectedPlugin] {
        &self.selected_port_scanners
    }

    pub fn selected_service_fingerprinters(&self) -> &[SelectedPlugin] {
        &self.selected_service_fingerprinters
    }

    pub fn selected_vuln_detectors(&self) -> &[SelectedPlugin] {
        &self.selected_vuln_detectors
    }

    /// Human-readable summary of the run. Only valid once DONE.
    pub fn build_loggable_execution_trace(&self, scan_results: &ScanResults) -> String {
        assert!(self.is_done(), "execution trace requested before the workflow is done");

        let phase = |name: &str, timer: &Stopwatch, plugins: &[SelectedPlugin]| {
            let infos: Vec<String> = plugins.iter().map(SelectedPlugin::info_message).collect();
            format!(
                "  {} phase ({}) with {} plugin(s):\n    {}",
                name,
                timer,
                plugins.len(),
                infos.join("\n    ")
            )
        };

        [
            String::from("Riptide scanning workflow traces:"),
            phase(
                "Port scanning",
                &self.port_scanning_timer,
                &self.selected_port_scanners,
            ),
            phase(
                "Service fingerprinting",
                &self.service_fingerprinting_timer,
                &self.selected_service_fingerprinters,
            ),
            phase(
                "Vuln detection",
                &self.vulnerability_detecting_timer,
                &self.selected_vuln_detectors,
            ),
            format!(
                "  # of detected vulnerability: {}.",
                scan_results.scan_findings.len()
            ),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use riptide_core::DetectionStatus;
    use riptide_plugin::testing::{definition, service, FakePortScanner, FakeVulnDetector};
    use riptide_plugin::{PluginType, PortScanner, VulnDetector};
    use std::sync::Arc;

    fn port_scanners() -> Vec<PluginMatchingResult<dyn PortScanner>> {
        let plugin: Arc<dyn PortScanner> = Arc::new(FakePortScanner::empty());
        vec![PluginMatchingResult::new(
            definition(PluginType::PortScan, "Ports"),
            plugin,
            Vec::new(),
        )]
    }

    fn detectors() -> Vec<PluginMatchingResult<dyn VulnDetector>> {
        let plugin: Arc<dyn VulnDetector> =
            Arc::new(FakeVulnDetector::new(DetectionStatus::VulnerabilityVerified));
        vec![PluginMatchingResult::new(
            definition(PluginType::VulnDetection, "Detector"),
            plugin,
            vec![service("ssh", 22), service("http", 80)],
        )]
    }

    fn none() -> Vec<PluginMatchingResult<dyn VulnDetector>> {
        Vec::new()
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_lifecycle_records_timings() {
        let mut tracer = ExecutionTracer::start_workflow();
        assert_eq!(tracer.current_stage(), ExecutionStage::Start);

        tracer.start_port_scanning(&port_scanners());
        tokio::time::advance(Duration::from_secs(3)).await;
        tracer.start_service_fingerprinting(&none());
        tokio::time::advance(Duration::from_secs(2)).await;
        tracer.start_vulnerability_detecting(&detectors());
        tokio::time::advance(Duration::from_secs(1)).await;
        tracer.set_done();

        assert!(tracer.is_done());
        assert_eq!(tracer.port_scanning_stage_runtime(), Duration::from_secs(3));
        assert_eq!(tracer.service_fingerprinting_stage_runtime(), Duration::from_secs(2));
        assert_eq!(tracer.vulnerability_detecting_stage_runtime(), Duration::from_secs(1));
        assert_eq!(tracer.selected_port_scanners().len(), 1);
        assert_eq!(tracer.selected_vuln_detectors()[0].matched_services.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loggable_trace() {
        let mut tracer = ExecutionTracer::start_workflow();
        tracer.start_port_scanning(&port_scanners());
        tracer.start_service_fingerprinting(&none());
        tracer.start_vulnerability_detecting(&detectors());
        tracer.set_done();

        let results = riptide_core::ScanResults::failed("", Utc::now(), Duration::ZERO);
        let trace = tracer.build_loggable_execution_trace(&results);
        assert_eq!(
            trace,
            "Riptide scanning workflow traces:\n\
             \x20 Port scanning phase (0.000s) with 1 plugin(s):\n\
             \x20   /test/PORT_SCAN/Ports/1.0\n\
             \x20 Service fingerprinting phase (0.000s) with 0 plugin(s):\n\
             \x20   \n\
             \x20 Vuln detection phase (0.000s) with 1 plugin(s):\n\
             \x20   /test/VULN_DETECTION/Detector/1.0 was selected for the following services: \
             ssh (TCP, port 22), http (TCP, port 80)\n\
             \x20 # of detected vulnerability: 0."
        );
    }

    #[test]
    #[should_panic]
    fn test_fingerprinting_before_port_scanning_panics() {
        let mut tracer = ExecutionTracer::start_workflow();
        tracer.start_service_fingerprinting(&none());
    }

    #[test]
    #[should_panic]
    fn test_double_port_scanning_panics() {
        let mut tracer = ExecutionTracer::start_workflow();
        tracer.start_port_scanning(&port_scanners());
        tracer.start_port_scanning(&port_scanners());
    }

    #[test]
    #[should_panic]
    fn test_detecting_skipping_fingerprinting_panics() {
        let mut tracer = ExecutionTracer::start_workflow();
        tracer.start_port_scanning(&port_scanners());
        tracer.start_vulnerability_detecting(&detectors());
    }

    #[test]
    #[should_panic]
    fn test_set_done_from_start_panics() {
        ExecutionTracer::start_workflow().set_done();
    }

    #[test]
    #[should_panic]
    fn test_trace_before_done_panics() {
        let tracer = ExecutionTracer::start_workflow();
        let results = riptide_core::ScanResults::failed("", Utc::now(), Duration::ZERO);
        tracer.build_loggable_execution_trace(&results);
    }

    #[test]
    fn test_force_done_from_any_stage() {
        let mut tracer = ExecutionTracer::start_workflow();
        tracer.start_port_scanning(&port_scanners());
        tracer.force_done();
        assert!(tracer.is_done());

        let mut fresh = ExecutionTracer::start_workflow();
        fresh.force_done();
        assert_eq!(fresh.current_stage(), ExecutionStage::Done);
    }
}
