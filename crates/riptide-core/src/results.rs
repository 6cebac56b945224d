//! Final outcome of a scan

use crate::detection::{DetectionReport, DetectionReportList, Vulnerability};
use crate::network::{NetworkService, ReconnaissanceReport, TargetInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Overall status of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Succeeded,
    /// Some vulnerability detectors failed
    PartiallySucceeded,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Succeeded => "SUCCEEDED",
            ScanStatus::PartiallySucceeded => "PARTIALLY_SUCCEEDED",
            ScanStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A confirmed vulnerability on a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFinding {
    pub target_info: TargetInfo,
    pub network_service: NetworkService,
    pub vulnerability: Vulnerability,
}

impl From<&DetectionReport> for ScanFinding {
    fn from(report: &DetectionReport) -> Self {
        Self {
            target_info: report.target_info.clone(),
            network_service: report.network_service.clone(),
            vulnerability: report.vulnerability.clone(),
        }
    }
}

/// Result of one scan of one target. Built once, at the end of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub scan_status: ScanStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_message: String,
    pub scan_start_timestamp: DateTime<Utc>,
    pub scan_duration: Duration,
    #[serde(default)]
    pub scan_findings: Vec<ScanFinding>,
    /// Every report returned by a succeeded detector, findings or not
    #[serde(default)]
    pub full_detection_reports: DetectionReportList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnaissance_report: Option<ReconnaissanceReport>,
}

impl ScanResults {
    /// A failed scan carrying `message`
    pub fn failed(
        message: impl Into<String>,
        scan_start_timestamp: DateTime<Utc>,
        scan_duration: Duration,
    ) -> Self {
        Self {
            scan_status: ScanStatus::Failed,
            status_message: message.into(),
            scan_start_timestamp,
            scan_duration,
            scan_findings: Vec::new(),
            full_detection_reports: DetectionReportList::empty(),
            reconnaissance_report: None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.scan_status == ScanStatus::Succeeded
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
