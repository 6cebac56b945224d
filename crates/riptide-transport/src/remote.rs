//! Remote vulnerability detector - forwards detection to a language server

use crate::client::{PluginService, TransportError};
use crate::types::*;
use riptide_core::{DetectionReportList, Error, NetworkService, Result, TargetInfo};
use riptide_plugin::{MatchedPlugin, PluginDefinition, RemoteVulnDetector, VulnDetector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Deadline applied to every language server call
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Exponential delays between health check attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay after the `retry`-th failed attempt, counting from 0
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(32) as i32);
        let delay = self.initial_interval.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_interval.as_secs_f64()))
    }
}

/// A `VulnDetector` backed by a language server.
///
/// One instance serves one scan: plugins queued with
/// `add_matched_plugin_to_detect` are all sent by the next `detect` call.
pub struct RemoteVulnDetectorImpl {
    service: Arc<dyn PluginService>,
    plugins_to_run: Mutex<Vec<MatchedPlugin>>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    deadline: Duration,
}

impl RemoteVulnDetectorImpl {
    pub fn new(service: Arc<dyn PluginService>) -> Self {
        Self {
            service,
            plugins_to_run: Mutex::new(Vec::new()),
            backoff: BackoffPolicy::default(),
            max_attempts: 3,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Health check attempts before giving up (at least one)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Plugins queued for the next `detect` call
    pub async fn plugins_to_run(&self) -> Vec<MatchedPlugin> {
        self.plugins_to_run.lock().await.clone()
    }

    /// Whether the server reports SERVING. Transport failures are retried with
    /// backoff; a clean NOT_SERVING answer is not.
    async fn check_health_with_backoffs(&self) -> Result<bool> {
        let mut attempt = 0;
        loop {
            match self
                .service
                .check_health(HealthCheckRequest::default(), self.deadline)
                .await
            {
                Ok(response) => {
                    if !response.is_serving() {
                        warn!("Language server is not serving.");
                    }
                    return Ok(response.is_serving());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(Error::language_server_caused_by(
                            "Language service is not registered.",
                            e,
                        ));
                    }
                    let delay = self.backoff.delay(attempt - 1);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Health check failed, retrying: {}", e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn rpc_error(error: TransportError) -> Error {
    Error::language_server_caused_by("Failed to get response from language server.", error)
}

#[async_trait::async_trait]
impl VulnDetector for RemoteVulnDetectorImpl {
    async fn detect(
        &self,
        target_info: &TargetInfo,
        _matched_services: &[NetworkService],
    ) -> Result<DetectionReportList> {
        if !self.check_health_with_backoffs().await? {
            return Ok(DetectionReportList::empty());
        }

        let request = RunRequest {
            target: target_info.clone(),
            plugins: self.plugins_to_run().await,
        };
        info!(
            plugins = request.plugins.len(),
            "Detecting with language server plugins..."
        );
        let response = self
            .service
            .run(request, self.deadline)
            .await
            .map_err(rpc_error)?;
        Ok(response.reports)
    }
}

#[async_trait::async_trait]
impl RemoteVulnDetector for RemoteVulnDetectorImpl {
    async fn get_all_plugins(&self) -> Result<Vec<PluginDefinition>> {
        if !self.check_health_with_backoffs().await? {
            return Ok(Vec::new());
        }

        info!("Getting language server plugins...");
        let response = self
            .service
            .list_plugins(ListPluginsRequest::default(), self.deadline)
            .await
            .map_err(rpc_error)?;
        Ok(response.plugins)
    }

    async fn add_matched_plugin_to_detect(&self, plugin: MatchedPlugin) {
        let mut plugins = self.plugins_to_run.lock().await;
        if !plugins.contains(&plugin) {
            plugins.push(plugin);
        }
    }

    fn as_vuln_detector(self: Arc<Self>) -> Arc<dyn VulnDetector> {
        self
    }
}
