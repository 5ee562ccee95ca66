/// Read worker: lists one directory on the local filesystem.
///
/// Runs on the scanner's rayon pool, one job per directory. A job stats
/// every entry outside any lock and streams the results to the tree writer
/// as [`ScanEvent`]s. It never touches the tree and never recurses; the
/// writer queues a new job for each subdirectory it accepts.
use crate::error::ScanError;
use crate::model::{Entry, NodeIndex, ReadOutcome};
use crate::scanner::event::ScanEvent;
use crate::scanner::progress::ScanProgress;
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// One directory to read.
#[derive(Debug, Clone)]
pub(crate) struct ReadJob {
    pub dir: NodeIndex,
    pub path: PathBuf,
}

/// Everything a worker needs, shared by all jobs of one scan.
pub(crate) struct JobContext {
    pub events: Sender<ScanEvent>,
    pub progress: Sender<ScanProgress>,
    pub cancel_flag: Arc<AtomicBool>,
    pub error_count: AtomicU64,
}

impl JobContext {
    #[inline]
    fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    fn send(&self, event: ScanEvent) {
        // The writer keeps its own sender alive until the scan ends, so a
        // failed send only happens after the scan is already over.
        if self.events.send(event).is_err() {
            trace!("event channel closed");
        }
    }

    fn finish(&self, dir: NodeIndex, outcome: ReadOutcome, error: Option<String>) {
        self.send(ScanEvent::ReadFinished {
            dir,
            outcome,
            error,
        });
    }

    /// Count and report a non-fatal error.
    pub(crate) fn report_error(&self, path: &Path, message: String) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        // Dropped when the channel is full.
        let _ = self.progress.try_send(ScanProgress::Error {
            path: path.to_string_lossy().into_owned(),
            message,
        });
    }
}

/// Read the directory of `job` and report everything found in it.
///
/// A cancelled scan still gets exactly one `ReadFinished` per job, with
/// [`ReadOutcome::Aborted`], so the writer's pending counts drain to zero.
pub(crate) fn read_directory(job: ReadJob, ctx: &JobContext) {
    let ReadJob { dir, path } = job;
    if ctx.is_cancelled() {
        ctx.finish(dir, ReadOutcome::Aborted, None);
        return;
    }

    ctx.send(ScanEvent::ReadStarted {
        dir,
        path: path.clone(),
    });

    let entries = match std::fs::read_dir(&path) {
        Ok(entries) => entries,
        Err(err) => {
            let err = ScanError::io(&path, err);
            warn!("Cannot read {}: {err}", path.display());
            ctx.report_error(&path, err.to_string());
            ctx.finish(dir, ReadOutcome::Error, Some(err.to_string()));
            return;
        }
    };

    let mut found: u64 = 0;
    for item in entries {
        if ctx.is_cancelled() {
            ctx.finish(dir, ReadOutcome::Aborted, None);
            return;
        }

        let item = match item {
            Ok(item) => item,
            Err(err) => {
                ctx.report_error(&path, err.to_string());
                continue;
            }
        };

        // The expensive syscall; symlinks are recorded, never followed.
        let item_path = item.path();
        let metadata = match std::fs::symlink_metadata(&item_path) {
            Ok(metadata) => metadata,
            Err(err) => {
                let err = ScanError::io(&item_path, err);
                warn!("{err}");
                ctx.report_error(&item_path, err.to_string());
                continue;
            }
        };

        let name = item.file_name();
        let entry = Entry::from_metadata(&*name.to_string_lossy(), &metadata);
        ctx.send(ScanEvent::EntryDiscovered {
            dir,
            entry,
            path: item_path,
        });
        found += 1;
    }

    trace!(?dir, found, "directory read");
    ctx.finish(dir, ReadOutcome::Ok, None);
}
