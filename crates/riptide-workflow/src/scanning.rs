//! Default scanning workflow - port scan, fingerprint, detect
//!
//! Each phase fans out to the plugin executor and waits for every execution
//! before the next phase starts. Port scanning failures abort the scan;
//! fingerprinting and detection failures degrade the result instead.

use crate::tracer::ExecutionTracer;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use riptide_common::{Clock, Config, SystemUtcClock};
use riptide_core::{
    DetectionReport, DetectionReportList, Error, NetworkService, PortScanningReport,
    ReconnaissanceReport, Result, ScanFinding, ScanResults, ScanStatus, ScanTarget, TargetInfo,
};
use riptide_plugin::{
    PluginExecutionPool, PluginExecutionResult, PluginExecutor, PluginExecutorConfig,
    PluginManager, PluginMatchingResult, PluginRegistry, ServiceFingerprinter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runs the three scanning phases against one target at a time
pub struct DefaultScanningWorkflow {
    plugin_manager: Arc<PluginManager>,
    plugin_executor: PluginExecutor,
    clock: Arc<dyn Clock>,
    cancellation: CancellationToken,
    execution_tracer: Option<ExecutionTracer>,
}

impl DefaultScanningWorkflow {
    pub fn new(plugin_manager: Arc<PluginManager>, plugin_executor: PluginExecutor) -> Self {
        Self {
            plugin_manager,
            plugin_executor,
            clock: Arc::new(SystemUtcClock),
            cancellation: CancellationToken::new(),
            execution_tracer: None,
        }
    }

    /// Build the manager and executor from configuration
    pub fn from_config(registry: Arc<PluginRegistry>, config: &Config) -> Self {
        let plugin_manager = PluginManager::from_config(
            registry,
            &config.plugin_manager,
            &config.callback_server,
        );
        let plugin_executor = PluginExecutor::new(PluginExecutionPool::new(
            config.plugin_execution.max_concurrency,
        ))
        .with_optional_deadline(config.plugin_execution.plugin_timeout());
        Self::new(Arc::new(plugin_manager), plugin_executor)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tracer of the most recent run, `None` before the first run
    pub fn execution_tracer(&self) -> Option<&ExecutionTracer> {
        self.execution_tracer.as_ref()
    }

    /// Handle that cancels the running scan and every later one
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Blocking variant of [`run_async`](Self::run_async). Must not be called
    /// from inside a tokio runtime.
    pub fn run(&mut self, scan_target: &ScanTarget) -> Result<ScanResults> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.run_async(scan_target)))
    }

    /// Scan `scan_target`. Never fails: errors are reported as a FAILED result.
    pub async fn run_async(&mut self, scan_target: &ScanTarget) -> ScanResults {
        let scan_start = self.clock.now();
        let mut tracer = ExecutionTracer::start_workflow();
        info!(target = %scan_target, "Starting Riptide scanning workflow");

        // Cancels stragglers if this future is dropped mid-scan.
        let run_token = self.cancellation.child_token();
        let _run_guard = run_token.clone().drop_guard();
        let executor = self
            .plugin_executor
            .clone()
            .with_cancellation_token(run_token.clone());

        let stages = ScanStages {
            plugin_manager: &self.plugin_manager,
            executor: &executor,
            cancellation: &run_token,
        };
        let scan_results = match stages
            .run(scan_target, &mut tracer, scan_start, self.clock.as_ref())
            .await
        {
            Ok(scan_results) => {
                info!("{}", tracer.build_loggable_execution_trace(&scan_results));
                scan_results
            }
            Err(e) => {
                error!(error = %e, code = e.code(), "Riptide scan failed, aborting workflow");
                tracer.force_done();
                ScanResults::failed(
                    e.to_string(),
                    scan_start,
                    elapsed_since(self.clock.as_ref(), scan_start),
                )
            }
        };

        self.execution_tracer = Some(tracer);
        scan_results
    }
}

struct ScanStages<'a> {
    plugin_manager: &'a PluginManager,
    executor: &'a PluginExecutor,
    cancellation: &'a CancellationToken,
}

impl ScanStages<'_> {
    async fn run(
        &self,
        scan_target: &ScanTarget,
        tracer: &mut ExecutionTracer,
        scan_start: DateTime<Utc>,
        clock: &dyn Clock,
    ) -> Result<ScanResults> {
        let port_scanning_report = match self.scan_ports(scan_target, tracer).await {
            Ok(report) => report,
            Err(e) => {
                self.check_cancelled()?;
                return Err(e);
            }
        };
        self.check_cancelled()?;

        let reconnaissance_report = self.fingerprint(port_scanning_report, tracer).await;
        self.check_cancelled()?;

        let detection_results = self
            .detect_vulnerabilities(&reconnaissance_report, tracer)
            .await?;
        // A scan whose detectors all completed stands even if cancelled afterwards.
        if detection_results.iter().any(|result| !result.is_succeeded()) {
            self.check_cancelled()?;
        }

        tracer.set_done();
        Ok(generate_scan_results(
            detection_results,
            reconnaissance_report,
            scan_start,
            elapsed_since(clock, scan_start),
        ))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(scan_cancelled());
        }
        Ok(())
    }

    async fn scan_ports(
        &self,
        scan_target: &ScanTarget,
        tracer: &mut ExecutionTracer,
    ) -> Result<PortScanningReport> {
        let port_scanner = self.plugin_manager.port_scanner().ok_or_else(|| {
            Error::ScanningWorkflow(String::from("At least one PortScanner plugin is required"))
        })?;
        tracer.start_port_scanning(std::slice::from_ref(&port_scanner));

        let plugin = Arc::clone(&port_scanner.plugin);
        let target = scan_target.clone();
        let config = PluginExecutorConfig::new(&port_scanner, async move {
            plugin.scan(&target).await
        });
        let report = self.executor.execute_async(config).await.into_result()?;
        debug!(
            services = report.network_services.len(),
            "Port scanning phase done"
        );
        Ok(report)
    }

    /// Services without a fingerprinter, and services whose fingerprinter
    /// failed, are carried into the reconnaissance report unchanged.
    async fn fingerprint(
        &self,
        port_scanning_report: PortScanningReport,
        tracer: &mut ExecutionTracer,
    ) -> ReconnaissanceReport {
        let PortScanningReport {
            target_info,
            network_services,
        } = port_scanning_report;

        let mut services_to_keep: Vec<NetworkService> = Vec::new();
        let mut fingerprinters: Vec<PluginMatchingResult<dyn ServiceFingerprinter>> = Vec::new();
        for network_service in network_services {
            match self.plugin_manager.service_fingerprinter(&network_service) {
                Some(fingerprinter) => fingerprinters.push(fingerprinter),
                None => services_to_keep.push(network_service),
            }
        }

        tracer.start_service_fingerprinting(&fingerprinters);
        info!(
            "Port scanning phase done, moving to service fingerprinting phase with '{}' fingerprinter(s) selected.",
            fingerprinters.len()
        );

        let executions = fingerprinters.iter().map(|fingerprinter| {
            let plugin = Arc::clone(&fingerprinter.plugin);
            let target_info = target_info.clone();
            let network_service = fingerprinter.matched_services[0].clone();
            self.executor.execute_async(PluginExecutorConfig::new(
                fingerprinter,
                async move { plugin.fingerprint(&target_info, &network_service).await },
            ))
        });
        let results = join_all(executions).await;

        let mut network_services = services_to_keep;
        for result in results {
            match result.result_data() {
                Some(report) => network_services.extend(report.network_services.iter().cloned()),
                None => {
                    debug!(
                        plugin_id = %result.plugin_id(),
                        "Fingerprinting failed, keeping the port scan view of the service"
                    );
                    network_services.extend(result.matched_services().iter().cloned());
                }
            }
        }

        ReconnaissanceReport {
            target_info,
            network_services,
        }
    }

    async fn detect_vulnerabilities(
        &self,
        reconnaissance_report: &ReconnaissanceReport,
        tracer: &mut ExecutionTracer,
    ) -> Result<Vec<PluginExecutionResult<DetectionReportList>>> {
        // Matching may list remote plugins, which waits on language servers.
        let detectors = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Err(scan_cancelled()),
            detectors = self.plugin_manager.vuln_detectors(reconnaissance_report) => detectors,
        };
        tracer.start_vulnerability_detecting(&detectors);
        info!("Service fingerprinting phase done, moving to vuln detection phase.");

        let executions = detectors.iter().map(|detector| {
            let plugin = Arc::clone(&detector.plugin);
            let target_info: TargetInfo = reconnaissance_report.target_info.clone();
            let matched_services = detector.matched_services.clone();
            self.executor.execute_async(PluginExecutorConfig::new(
                detector,
                async move { plugin.detect(&target_info, &matched_services).await },
            ))
        });
        Ok(join_all(executions).await)
    }
}

fn generate_scan_results(
    detection_results: Vec<PluginExecutionResult<DetectionReportList>>,
    reconnaissance_report: ReconnaissanceReport,
    scan_start: DateTime<Utc>,
    scan_duration: Duration,
) -> ScanResults {
    let total = detection_results.len();
    let mut detection_reports: Vec<DetectionReport> = Vec::new();
    let mut failed_plugins: Vec<String> = Vec::new();
    for result in detection_results {
        let plugin_id = result.plugin_id();
        match result.into_result() {
            Ok(reports) => detection_reports.extend(reports.detection_reports),
            Err(e) => {
                debug!(plugin_id = %plugin_id, error = %e, "Vuln detector failed");
                failed_plugins.push(plugin_id);
            }
        }
    }

    let (scan_status, status_message) = if failed_plugins.is_empty() {
        (ScanStatus::Succeeded, String::new())
    } else if failed_plugins.len() == total {
        (ScanStatus::Failed, String::from("All VulnDetectors failed."))
    } else {
        (
            ScanStatus::PartiallySucceeded,
            format!("Failed plugins:\n{}", failed_plugins.join("\n")),
        )
    };

    let scan_findings = detection_reports
        .iter()
        .filter(|report| report.detection_status.is_finding())
        .map(ScanFinding::from)
        .collect();

    ScanResults {
        scan_status,
        status_message,
        scan_start_timestamp: scan_start,
        scan_duration,
        scan_findings,
        full_detection_reports: DetectionReportList::new(detection_reports),
        reconnaissance_report: Some(reconnaissance_report),
    }
}

fn scan_cancelled() -> Error {
    Error::ScanCancelled {
        reason: String::from("scan cancelled by caller"),
    }
}

fn elapsed_since(clock: &dyn Clock, start: DateTime<Utc>) -> Duration {
    (clock.now() - start).to_std().unwrap_or(Duration::ZERO)
}
