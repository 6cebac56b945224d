//! Riptide Workflow - The three-phase scanning pipeline
//!
//! Port scanning, then service fingerprinting, then vulnerability detection.
//! `DefaultScanningWorkflow` chains the phases and folds plugin failures into a
//! single `ScanResults`; `ExecutionTracer` enforces phase order and records timings.

pub mod advisories;
pub mod scanning;
pub mod tracer;

pub use advisories::AdvisoriesWorkflow;
pub use scanning::DefaultScanningWorkflow;
pub use tracer::{ExecutionStage, ExecutionTracer, SelectedPlugin};
