//! Language server wire messages
//!
//! Each RPC is a JSON `POST` to `<base url>/plugin_service/<operation>`.

use riptide_core::{DetectionReportList, TargetInfo};
use riptide_plugin::{MatchedPlugin, PluginDefinition};
use serde::{Deserialize, Serialize};

pub const HEALTH_CHECK_PATH: &str = "/plugin_service/health_check";
pub const LIST_PLUGINS_PATH: &str = "/plugin_service/list_plugins";
pub const RUN_PATH: &str = "/plugin_service/run";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckRequest {}

/// Health state reported by a language server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: ServingStatus,
}

impl HealthCheckResponse {
    pub fn serving() -> Self {
        Self {
            status: ServingStatus::Serving,
        }
    }

    pub fn not_serving() -> Self {
        Self {
            status: ServingStatus::NotServing,
        }
    }

    pub fn is_serving(&self) -> bool {
        self.status == ServingStatus::Serving
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPluginsRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPluginsResponse {
    #[serde(default)]
    pub plugins: Vec<PluginDefinition>,
}

/// Run the listed remote plugins against a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub target: TargetInfo,
    #[serde(default)]
    pub plugins: Vec<MatchedPlugin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(default)]
    pub reports: DetectionReportList,
}
