/// The tree writer: the only code that mutates a scan's tree.
///
/// Read workers send [`ScanEvent`]s over an unbounded channel. The writer
/// drains whatever has queued up, up to `BATCH_SIZE` events, and applies
/// the whole batch under a **single write lock**, so readers of the
/// `LiveTree` see at most one lock cycle per batch rather than one per
/// entry. Each accepted subdirectory is either settled on the spot
/// (excluded, or a mount point that is not crossed) or queued in the tree
/// and handed to the worker pool as a new read job.
///
/// When the root is no longer busy the writer runs the final cleanup pass
/// over the whole tree, reports completion and exits.
use crate::exclude::ExcludeRule;
use crate::model::{DirTree, Entry, NodeIndex, ReadOutcome, Totals};
use crate::scanner::event::ScanEvent;
use crate::scanner::local::{self, JobContext, ReadJob};
use crate::scanner::progress::ScanProgress;
use crate::scanner::LiveTree;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum number of events applied under one write lock.
const BATCH_SIZE: usize = 2_000;

/// How often a progress update is sent while the scan runs.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) struct TreeWriter {
    live_tree: LiveTree,
    events_rx: Receiver<ScanEvent>,
    progress_tx: Sender<ScanProgress>,
    pool: rayon::ThreadPool,
    ctx: Arc<JobContext>,
    rule: Box<dyn ExcludeRule>,
    cross_filesystems: bool,

    files_found: u64,
    dirs_found: u64,
    aborted_reads: u64,
    current_path: String,
}

impl TreeWriter {
    pub(crate) fn new(
        live_tree: LiveTree,
        events_rx: Receiver<ScanEvent>,
        progress_tx: Sender<ScanProgress>,
        pool: rayon::ThreadPool,
        ctx: Arc<JobContext>,
        rule: Box<dyn ExcludeRule>,
        cross_filesystems: bool,
    ) -> Self {
        Self {
            live_tree,
            events_rx,
            progress_tx,
            pool,
            ctx,
            rule,
            cross_filesystems,
            files_found: 0,
            dirs_found: 1, // the root
            aborted_reads: 0,
            current_path: String::new(),
        }
    }

    /// Read the tree below `root` until every job has reported back.
    pub(crate) fn run(mut self, root_path: PathBuf) {
        let start = Instant::now();
        let root = {
            let mut tree = self.live_tree.write();
            let root = tree.root();
            if let Err(err) = tree.queue_read(root) {
                warn!("Cannot queue scan root: {err}");
                return;
            }
            root
        };
        self.dispatch(ReadJob {
            dir: root,
            path: root_path,
        });

        let mut batch: Vec<ScanEvent> = Vec::with_capacity(BATCH_SIZE);
        let mut last_update = Instant::now();
        loop {
            match self.events_rx.recv_timeout(PROGRESS_INTERVAL) {
                Ok(event) => batch.push(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Event channel closed before the scan settled");
                    return;
                }
            }
            batch.extend(self.events_rx.try_iter().take(BATCH_SIZE - batch.len()));

            if let Some(totals) = self.apply_batch(&mut batch, root) {
                self.finish(start, totals);
                return;
            }

            if last_update.elapsed() >= PROGRESS_INTERVAL {
                self.send_update(root);
                last_update = Instant::now();
            }
        }
    }

    /// Apply `batch` under one write lock. Returns the root totals once
    /// the whole tree has settled and been finalized.
    fn apply_batch(&mut self, batch: &mut Vec<ScanEvent>, root: NodeIndex) -> Option<Totals> {
        if batch.is_empty() {
            return None;
        }
        let live_tree = Arc::clone(&self.live_tree);
        let mut tree = live_tree.write();
        for event in batch.drain(..) {
            self.apply(&mut tree, event);
        }

        if tree.is_busy(root) {
            return None;
        }
        match tree.finalize_all(root) {
            Ok(dirs) => debug!(dirs, "tree finalized"),
            Err(err) => warn!("Final cleanup failed: {err}"),
        }
        Some(tree.totals(root))
    }

    fn apply(&mut self, tree: &mut DirTree, event: ScanEvent) {
        match event {
            ScanEvent::ReadStarted { dir, path } => {
                self.current_path = path.to_string_lossy().into_owned();
                if let Err(err) = tree.begin_read(dir) {
                    warn!(?dir, "Rejected read start: {err}");
                }
            }
            ScanEvent::EntryDiscovered { dir, entry, path } => self.ingest(tree, dir, entry, path),
            ScanEvent::ReadFinished {
                dir,
                outcome,
                error,
            } => {
                if outcome == ReadOutcome::Aborted {
                    self.aborted_reads += 1;
                }
                if let Some(message) = error {
                    debug!(?dir, "read failed: {message}");
                }
                if let Err(err) = tree.end_read(dir, outcome) {
                    warn!(?dir, "Rejected read end: {err}");
                }
            }
        }
    }

    fn ingest(&mut self, tree: &mut DirTree, dir: NodeIndex, entry: Entry, path: PathBuf) {
        let is_dir = entry.is_dir();
        let device = entry.device;
        let name = entry.name.clone();

        let child = match tree.attach_child(dir, entry) {
            Ok(child) => child,
            Err(err) => {
                warn!(?dir, "Rejected entry {name}: {err}");
                return;
            }
        };
        if !is_dir {
            self.files_found += 1;
            return;
        }
        self.dirs_found += 1;

        if self.rule.should_exclude(&path) {
            debug!("Excluding {}", path.display());
            Self::settle_unread(tree, child);
            return;
        }

        if device != tree.node(dir).entry.device {
            if let Err(err) = tree.set_mount_point(child, true) {
                warn!("{err}");
            }
            if !self.cross_filesystems {
                debug!("Not crossing mount point {}", path.display());
                Self::settle_unread(tree, child);
                return;
            }
        }

        if let Err(err) = tree.queue_read(child) {
            warn!(?child, "Cannot queue {}: {err}", path.display());
            return;
        }
        self.dispatch(ReadJob { dir: child, path });
    }

    /// Exclude a directory that has not been queued; it settles at once.
    fn settle_unread(tree: &mut DirTree, dir: NodeIndex) {
        if let Err(err) = tree.mark_excluded(dir) {
            warn!(?dir, "Cannot exclude directory: {err}");
        }
    }

    fn dispatch(&self, job: ReadJob) {
        let ctx = Arc::clone(&self.ctx);
        self.pool.spawn(move || local::read_directory(job, &ctx));
    }

    fn send_update(&self, root: NodeIndex) {
        let total_size = self.live_tree.read().total_size(root);
        // Updates are lossy; a caller that is not draining misses some.
        let _ = self.progress_tx.try_send(ScanProgress::Update {
            files_found: self.files_found,
            dirs_found: self.dirs_found,
            total_size,
            current_path: self.current_path.clone(),
        });
    }

    fn finish(&self, start: Instant, totals: Totals) {
        let duration = start.elapsed();
        let error_count = self.ctx.error_count.load(Ordering::Relaxed);

        if self.aborted_reads > 0 {
            info!(
                "Scan cancelled after {:?}: {} files, {} dirs, {} reads aborted",
                duration, self.files_found, self.dirs_found, self.aborted_reads
            );
            let _ = self.progress_tx.send(ScanProgress::Cancelled);
            return;
        }

        info!(
            "Scan complete: {} files, {} dirs, {} errors in {:?}",
            self.files_found, self.dirs_found, error_count, duration
        );
        let _ = self.progress_tx.send(ScanProgress::Complete {
            duration,
            error_count,
            totals,
        });
    }
}
