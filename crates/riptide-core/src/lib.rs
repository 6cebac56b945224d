//! Riptide Core - Data model and error handling shared by every Riptide crate
//!
//! This crate provides the types that flow between the scanning phases:
//! - `ScanTarget`, `NetworkEndpoint`: what to scan
//! - `NetworkService`, `TargetInfo`: what reconnaissance discovers
//! - `DetectionReport`, `Vulnerability`: what detectors report
//! - `ScanResults`: the final outcome of one scan

pub mod detection;
pub mod error;
pub mod network;
pub mod results;
pub mod severity;
pub mod target;

// Re-export commonly used types at crate root
pub use detection::{
    DetectionReport, DetectionReportList, DetectionStatus, Vulnerability, VulnerabilityId,
};
pub use error::{Error, Result};
pub use network::{
    FingerprintingReport, NetworkService, OperatingSystemClass, PortScanningReport,
    ReconnaissanceReport, Software, TargetInfo, TransportProtocol,
};
pub use results::{ScanFinding, ScanResults, ScanStatus};
pub use severity::Severity;
pub use target::{NetworkEndpoint, ScanTarget};
