//! Scan results archiving

use riptide_core::{Result, ScanResults};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes scan results as pretty-printed JSON to a local file
#[derive(Debug, Clone)]
pub struct LocalFileArchiver {
    path: PathBuf,
}

impl LocalFileArchiver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn archive(&self, scan_results: &ScanResults) -> Result<()> {
        let json = scan_results.to_json_pretty()?;
        std::fs::write(&self.path, json)?;
        info!(path = %self.path.display(), "Scan results archived");
        Ok(())
    }
}
