//! Vulnerability severity levels

use serde::{Deserialize, Serialize};

/// Severity level of a vulnerability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Severity was not assessed
    #[default]
    Unspecified,
    /// Informational, no direct security impact
    Minimal,
    Low,
    Medium,
    High,
    /// Immediate action required
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unspecified => "Unspecified",
            Severity::Minimal => "Minimal",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
