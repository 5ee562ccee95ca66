/// Scan configuration.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Configuration for one scan.
///
/// Every field has a default, so a JSON file only needs the keys it
/// changes. Command-line flags are applied on top by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directory to scan.
    pub root: PathBuf,

    /// Read into directories on other filesystems instead of treating
    /// them as excluded mount points.
    pub cross_filesystems: bool,

    /// Directory names or paths to skip (see [`ExcludeRules`](crate::ExcludeRules)).
    pub exclude_patterns: Vec<String>,

    /// Read worker threads (0 = one per CPU).
    pub threads: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ScanConfig {
    /// Create a config for scanning `root` with defaults for everything else.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cross_filesystems: false,
            exclude_patterns: Vec::new(),
            threads: 0,
        }
    }

    /// Load a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ScanError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no scan can run with.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.root.as_os_str().is_empty() {
            return Err(ScanError::config("Root path cannot be empty"));
        }
        if self.exclude_patterns.iter().any(|p| p.is_empty()) {
            return Err(ScanError::config("Exclude patterns cannot be empty"));
        }
        Ok(())
    }

    /// Number of read workers to start.
    pub fn worker_threads(&self) -> usize {
        match self.threads {
            0 => num_cpus::get(),
            n => n,
        }
    }
}
