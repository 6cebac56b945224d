//! Scripted plugin service for tests

use crate::client::{PluginService, TransportError};
use crate::types::*;
use riptide_core::DetectionReportList;
use riptide_plugin::PluginDefinition;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// In-memory `PluginService` with canned answers
#[derive(Debug)]
pub struct ScriptedPluginService {
    status: ServingStatus,
    failing_health_checks: AtomicUsize,
    health_checks: AtomicUsize,
    plugins: Vec<PluginDefinition>,
    reports: DetectionReportList,
    fail_runs: bool,
    run_requests: Mutex<Vec<RunRequest>>,
}

impl ScriptedPluginService {
    fn with_status(status: ServingStatus) -> Self {
        Self {
            status,
            failing_health_checks: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            plugins: Vec::new(),
            reports: DetectionReportList::empty(),
            fail_runs: false,
            run_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn serving() -> Self {
        Self::with_status(ServingStatus::Serving)
    }

    pub fn not_serving() -> Self {
        Self::with_status(ServingStatus::NotServing)
    }

    /// The first `n` health checks fail at the transport level
    pub fn failing_health_checks(self, n: usize) -> Self {
        self.failing_health_checks.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_plugins(mut self, plugins: Vec<PluginDefinition>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_reports(mut self, reports: DetectionReportList) -> Self {
        self.reports = reports;
        self
    }

    /// Every run call fails at the transport level
    pub fn failing_runs(mut self) -> Self {
        self.fail_runs = true;
        self
    }

    /// Number of health checks received
    pub fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub async fn run_requests(&self) -> Vec<RunRequest> {
        self.run_requests.lock().await.clone()
    }
}

fn unavailable() -> TransportError {
    TransportError::Api {
        status: 503,
        message: String::from("unavailable"),
    }
}

#[async_trait::async_trait]
impl PluginService for ScriptedPluginService {
    async fn check_health(
        &self,
        _request: HealthCheckRequest,
        _deadline: Duration,
    ) -> Result<HealthCheckResponse, TransportError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_health_checks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_health_checks.store(remaining - 1, Ordering::SeqCst);
            return Err(unavailable());
        }
        Ok(HealthCheckResponse {
            status: self.status,
        })
    }

    async fn list_plugins(
        &self,
        _request: ListPluginsRequest,
        _deadline: Duration,
    ) -> Result<ListPluginsResponse, TransportError> {
        Ok(ListPluginsResponse {
            plugins: self.plugins.clone(),
        })
    }

    async fn run(
        &self,
        request: RunRequest,
        _deadline: Duration,
    ) -> Result<RunResponse, TransportError> {
        self.run_requests.lock().await.push(request);
        if self.fail_runs {
            return Err(unavailable());
        }
        Ok(RunResponse {
            reports: self.reports.clone(),
        })
    }
}
