//! RPC client for language servers
//!
//! `PluginService` is the seam the remote detector talks through;
//! `HttpPluginService` implements it as JSON over HTTP.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::types::*;

// ── Client Errors ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Language server error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Response of {size} bytes exceeds the {limit} byte limit")]
    ResponseTooLarge { size: usize, limit: usize },
}

// ── Service Interface ────────────────────────────────────────────────────────

/// The three RPCs a language server answers, each bounded by a deadline
#[async_trait::async_trait]
pub trait PluginService: Send + Sync {
    async fn check_health(
        &self,
        request: HealthCheckRequest,
        deadline: Duration,
    ) -> Result<HealthCheckResponse, TransportError>;

    async fn list_plugins(
        &self,
        request: ListPluginsRequest,
        deadline: Duration,
    ) -> Result<ListPluginsResponse, TransportError>;

    async fn run(
        &self,
        request: RunRequest,
        deadline: Duration,
    ) -> Result<RunResponse, TransportError>;
}

// ── HTTP Implementation ──────────────────────────────────────────────────────

/// `PluginService` over HTTP/JSON
#[derive(Debug, Clone)]
pub struct HttpPluginService {
    base_url: String,
    http: Client,
    max_inbound_message_bytes: usize,
}

impl HttpPluginService {
    pub const DEFAULT_MAX_INBOUND_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent(format!("Riptide/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            max_inbound_message_bytes: Self::DEFAULT_MAX_INBOUND_MESSAGE_BYTES,
        })
    }

    pub fn with_max_inbound_message_bytes(mut self, limit: usize) -> Self {
        self.max_inbound_message_bytes = limit;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn call<Req, Res>(
        &self,
        path: &str,
        request: &Req,
        deadline: Duration,
    ) -> Result<Res, TransportError>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let url = self.api_url(path);
        debug!("POST {}", url);

        let mut res = self
            .http
            .post(&url)
            .timeout(deadline)
            .json(request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, deadline))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let text = res.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status,
                message: text,
            });
        }

        let limit = self.max_inbound_message_bytes;
        if let Some(length) = res.content_length() {
            if length as usize > limit {
                return Err(TransportError::ResponseTooLarge {
                    size: length as usize,
                    limit,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = res
            .chunk()
            .await
            .map_err(|e| map_reqwest_error(e, deadline))?
        {
            if body.len() + chunk.len() > limit {
                return Err(TransportError::ResponseTooLarge {
                    size: body.len() + chunk.len(),
                    limit,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

fn map_reqwest_error(error: reqwest::Error, deadline: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::DeadlineExceeded(deadline)
    } else {
        TransportError::Http(error)
    }
}

#[async_trait::async_trait]
impl PluginService for HttpPluginService {
    async fn check_health(
        &self,
        request: HealthCheckRequest,
        deadline: Duration,
    ) -> Result<HealthCheckResponse, TransportError> {
        self.call(HEALTH_CHECK_PATH, &request, deadline).await
    }

    async fn list_plugins(
        &self,
        request: ListPluginsRequest,
        deadline: Duration,
    ) -> Result<ListPluginsResponse, TransportError> {
        self.call(LIST_PLUGINS_PATH, &request, deadline).await
    }

    async fn run(
        &self,
        request: RunRequest,
        deadline: Duration,
    ) -> Result<RunResponse, TransportError> {
        self.call(RUN_PATH, &request, deadline).await
    }
}
