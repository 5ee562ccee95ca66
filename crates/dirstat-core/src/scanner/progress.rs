/// Scan progress reporting. Lightweight messages sent from the tree
/// writer to whoever drives the scan via a crossbeam channel.
use crate::model::Totals;
use std::time::Duration;

/// Progress updates sent from the scan to the caller.
///
/// The actual tree data is in the shared `LiveTree`; these messages
/// carry only counters and status flags.
#[derive(Debug)]
pub enum ScanProgress {
    /// Periodic update with running totals.
    Update {
        files_found: u64,
        dirs_found: u64,
        total_size: u64,
        current_path: String,
    },
    /// A non-fatal error (a directory or entry that could not be read).
    Error { path: String, message: String },
    /// Every read finished and the tree has been finalized.
    Complete {
        duration: Duration,
        error_count: u64,
        totals: Totals,
    },
    /// Scan was cancelled. Partial results stay in the tree.
    Cancelled,
}

impl ScanProgress {
    /// `true` for the last message a scan sends.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Cancelled)
    }
}
