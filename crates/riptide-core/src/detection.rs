//! Detection reports produced by vulnerability detectors

use crate::network::{NetworkService, TargetInfo};
use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome a detector reports for one vulnerability on one service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionStatus {
    #[default]
    Unspecified,
    /// The service was checked and is not vulnerable
    Safe,
    /// The vulnerable software is present but exploitation was not confirmed
    VulnerabilityPresent,
    /// The vulnerability was confirmed
    VulnerabilityVerified,
}

impl DetectionStatus {
    /// Whether a report with this status becomes a scan finding
    pub fn is_finding(&self) -> bool {
        matches!(
            self,
            DetectionStatus::VulnerabilityPresent | DetectionStatus::VulnerabilityVerified
        )
    }
}

/// Identifier of a vulnerability within a publisher's namespace, e.g. `CVE / CVE-2021-44228`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VulnerabilityId {
    pub publisher: String,
    pub value: String,
}

impl VulnerabilityId {
    pub fn new(publisher: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            publisher: publisher.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for VulnerabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.publisher, self.value)
    }
}

/// A vulnerability advisory
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vulnerability {
    pub main_id: VulnerabilityId,
    #[serde(default)]
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_ids: Vec<VulnerabilityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_v3_score: Option<f32>,
}

impl Vulnerability {
    pub fn new(main_id: VulnerabilityId, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            main_id,
            severity,
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = recommendation.into();
        self
    }

    pub fn with_related_id(mut self, id: VulnerabilityId) -> Self {
        self.related_ids.push(id);
        self
    }
}

/// One detector verdict about one service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub target_info: TargetInfo,
    pub network_service: NetworkService,
    pub detection_timestamp: DateTime<Utc>,
    pub detection_status: DetectionStatus,
    pub vulnerability: Vulnerability,
}

/// Reports from a single detector invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionReportList {
    #[serde(default)]
    pub detection_reports: Vec<DetectionReport>,
}

impl DetectionReportList {
    pub fn new(detection_reports: Vec<DetectionReport>) -> Self {
        Self { detection_reports }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.detection_reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detection_reports.is_empty()
    }
}

impl From<Vec<DetectionReport>> for DetectionReportList {
    fn from(detection_reports: Vec<DetectionReport>) -> Self {
        Self { detection_reports }
    }
}
