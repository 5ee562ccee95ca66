/// Scanner module. Reads a local directory tree into a [`DirTree`].
///
/// - **Read workers** (`local`) run on a rayon pool, one job per
///   directory, and only ever talk to the filesystem and the event channel.
/// - **The tree writer** (`writer`) is the single mutation path. It applies
///   worker events in batches, queues new jobs, and finalizes the tree when
///   the root settles.
///
/// The tree is a shared **`LiveTree`** (`Arc<RwLock<DirTree>>`), so a
/// caller can read totals of the partially-built tree while the scan runs.
pub mod event;
pub mod progress;

mod local;
mod writer;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::exclude::{ExcludeRule, ExcludeRules};
use crate::model::{DirTree, Entry};
use local::JobContext;
use progress::ScanProgress;
use writer::TreeWriter;

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::info;

pub use event::ScanEvent;

/// A shared, concurrently-readable directory tree.
///
/// The tree writer holds the write lock once per batch of events; readers
/// take the read lock to query totals and read states.
pub type LiveTree = Arc<RwLock<DirTree>>;

/// Maximum number of progress messages that may queue up in the channel.
///
/// Periodic updates and per-entry errors are dropped when the channel is
/// full; only the final `Complete` / `Cancelled` waits for room.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Arena slots reserved up front.
const INITIAL_TREE_CAPACITY: usize = 65_536;

/// Handle to a running or completed scan. Allows cancellation and
/// receiving progress updates.
pub struct ScanHandle {
    /// Receiver for progress updates from the tree writer.
    pub progress_rx: Receiver<ScanProgress>,
    /// Shared tree that is populated incrementally during scanning.
    pub live_tree: LiveTree,
    /// Flag to request cancellation.
    cancel_flag: Arc<AtomicBool>,
    /// Join handle for the writer thread.
    _thread: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Request the scan to stop as soon as possible.
    ///
    /// Directories not yet read end up `Aborted`; whatever was already
    /// read stays in the tree.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// Block until the scan reports `Complete` or `Cancelled`, discarding
    /// intermediate progress. Returns `None` if the writer went away
    /// without reporting.
    pub fn wait(&self) -> Option<ScanProgress> {
        self.progress_rx.iter().find(ScanProgress::is_terminal)
    }
}

/// Start a scan of `config.root`, excluding directories matched by
/// `config.exclude_patterns`.
pub fn start_scan(config: ScanConfig) -> Result<ScanHandle, ScanError> {
    let rules = ExcludeRules::new(config.exclude_patterns.iter().cloned());
    start_scan_with(config, rules)
}

/// Start a scan with a custom exclusion rule.
///
/// Fails up front if the root cannot be stat'ed or is not a directory, or
/// if the worker pool or writer thread cannot be started. Everything that
/// goes wrong after that is reported through the progress channel and the
/// read states in the tree.
pub fn start_scan_with<R>(config: ScanConfig, rule: R) -> Result<ScanHandle, ScanError>
where
    R: ExcludeRule + 'static,
{
    config.validate()?;
    let root_path = config.root.clone();
    let metadata = std::fs::metadata(&root_path).map_err(|e| ScanError::io(&root_path, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory { path: root_path });
    }

    let threads = config.worker_threads();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("dirstat-read-{i}"))
        .build()
        .map_err(|e| ScanError::Spawn {
            message: e.to_string(),
        })?;

    let (progress_tx, progress_rx) =
        crossbeam_channel::bounded::<ScanProgress>(PROGRESS_CHANNEL_CAPACITY);
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let cancel_flag = Arc::new(AtomicBool::new(false));

    // The root keeps the path as given for its name; every other node is
    // named by its last component.
    let root_entry = Entry::from_metadata(&*root_path.to_string_lossy(), &metadata);
    let live_tree: LiveTree = Arc::new(RwLock::new(DirTree::with_capacity(
        root_entry,
        INITIAL_TREE_CAPACITY,
    )));

    let ctx = Arc::new(JobContext {
        events: events_tx,
        progress: progress_tx.clone(),
        cancel_flag: Arc::clone(&cancel_flag),
        error_count: AtomicU64::new(0),
    });
    let writer = TreeWriter::new(
        Arc::clone(&live_tree),
        events_rx,
        progress_tx,
        pool,
        ctx,
        Box::new(rule),
        config.cross_filesystems,
    );

    info!(
        "Starting scan of {} with {} read threads",
        root_path.display(),
        threads
    );
    let thread = thread::Builder::new()
        .name("dirstat-writer".into())
        .spawn(move || writer.run(root_path))
        .map_err(|e| ScanError::Spawn {
            message: e.to_string(),
        })?;

    Ok(ScanHandle {
        progress_rx,
        live_tree,
        cancel_flag,
        _thread: Some(thread),
    })
}
