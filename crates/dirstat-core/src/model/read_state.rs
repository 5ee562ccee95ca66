/// Per-directory read state and pending-job bookkeeping.
///
/// Every container has its own [`ReadState`] plus a counter of read jobs
/// still outstanding strictly below it. A job is counted in the ancestors
/// from the moment it is queued (or begun, if it was never queued) until
/// its terminal state is recorded. Both updates happen inside the same
/// `&mut DirTree` call, so a reader holding the tree lock never sees a
/// directory settled while an ancestor still counts it, or the reverse.
use super::file_node::{NodeIndex, ReadOutcome, ReadState};
use super::file_tree::DirTree;
use crate::error::TreeError;
use tracing::debug;

impl DirTree {
    /// Read state of `index`. Plain nodes are always `Finished`; dot
    /// entries report the state of the directory they belong to.
    pub fn read_state(&self, index: NodeIndex) -> ReadState {
        let node = self.node(index);
        match node.dir() {
            None => ReadState::Finished,
            Some(dir) if dir.is_dot_entry => match node.parent {
                Some(owner) => self.read_state(owner),
                None => dir.read_state,
            },
            Some(dir) => dir.read_state,
        }
    }

    /// Outstanding read jobs anywhere below `index`.
    pub fn pending_read_jobs(&self, index: NodeIndex) -> u32 {
        self.node(index).dir().map_or(0, |dir| dir.pending_read_jobs)
    }

    /// `true` while `index` or anything below it is still being read.
    /// Excluded directories are never busy.
    pub fn is_busy(&self, index: NodeIndex) -> bool {
        let node = self.node(index);
        match node.dir() {
            None => false,
            Some(dir) if dir.is_excluded => false,
            Some(dir) if dir.is_dot_entry => self.read_state(index).is_busy(),
            Some(dir) => dir.read_state.is_busy() || dir.pending_read_jobs > 0,
        }
    }

    #[inline]
    pub fn is_finished(&self, index: NodeIndex) -> bool {
        !self.is_busy(index)
    }

    /// Put `dir` in the read queue and count its job in every ancestor.
    pub fn queue_read(&mut self, dir: NodeIndex) -> Result<(), TreeError> {
        let info = self.job_target(dir)?;
        if info.job_registered {
            return Err(TreeError::AlreadyQueued(dir));
        }
        info.job_registered = true;
        info.read_state = ReadState::Queued;
        self.read_job_added(dir);
        debug!(?dir, "read queued");
        Ok(())
    }

    /// Start reading `dir`. Registers the job if it was not queued first.
    pub fn begin_read(&mut self, dir: NodeIndex) -> Result<(), TreeError> {
        if self.settled_by_exclusion(dir)? {
            return Ok(());
        }
        let info = self.job_target(dir)?;
        if info.read_state == ReadState::Reading {
            return Err(TreeError::AlreadyQueued(dir));
        }
        let register = !info.job_registered;
        info.job_registered = true;
        info.read_state = ReadState::Reading;
        if register {
            self.read_job_added(dir);
        }
        debug!(?dir, "read started");
        Ok(())
    }

    /// Record how reading `dir` ended, release its job in every ancestor,
    /// and finalize this directory level.
    ///
    /// Partial results are kept: whatever was attached before an error or
    /// abort stays in the tree. A late job for a directory that exclusion
    /// already settled is ignored.
    pub fn end_read(&mut self, dir: NodeIndex, outcome: ReadOutcome) -> Result<(), TreeError> {
        if self.settled_by_exclusion(dir)? {
            return Ok(());
        }
        let info = self.job_target(dir)?;
        info.read_state = outcome.into();
        let registered = info.job_registered;
        if let Some(dot) = info.dot_entry {
            self.dir_slot_mut(dot).read_state = outcome.into();
        }

        if registered {
            match outcome {
                ReadOutcome::Aborted => self.read_job_aborted(dir),
                ReadOutcome::Ok | ReadOutcome::Error => self.read_job_finished(dir),
            }
        } else {
            self.mark_dirty_upwards(dir);
        }
        debug!(?dir, ?outcome, "read ended");
        self.finalize_local(dir)
    }

    /// Exclude `dir` from reading. Only possible while it has no children
    /// and has not settled; afterwards it refuses every new child.
    ///
    /// A directory that is not being read settles as `Finished` right here
    /// and releases its queued job. One already `Reading` settles when that
    /// read ends.
    pub fn mark_excluded(&mut self, dir: NodeIndex) -> Result<(), TreeError> {
        let info = self.job_target(dir)?;
        if info.first_child.is_some() || info.dot_entry.is_some() {
            return Err(TreeError::ExcludeNonEmpty(dir));
        }
        info.is_excluded = true;
        if info.read_state == ReadState::Reading {
            debug!(?dir, "excluded while reading");
            return Ok(());
        }
        info.read_state = ReadState::Finished;
        if info.job_registered {
            self.read_job_finished(dir);
        } else {
            self.mark_dirty_upwards(dir);
        }
        debug!(?dir, "excluded");
        self.finalize_local(dir)
    }

    /// End every outstanding read in the subtree of `dir` (itself included)
    /// as aborted, deepest first. Returns how many directories were aborted.
    pub fn abort_subtree(&mut self, dir: NodeIndex) -> Result<usize, TreeError> {
        self.try_dir(dir)?;
        let mut aborted = 0;
        for idx in self.containers_post_order(dir) {
            if self.dir_slot_mut(idx).read_state.is_busy() {
                self.end_read(idx, ReadOutcome::Aborted)?;
                aborted += 1;
            }
        }
        debug!(?dir, aborted, "subtree aborted");
        Ok(aborted)
    }

    /// Container that may still change read state.
    fn job_target(&mut self, dir: NodeIndex) -> Result<&mut super::DirInfo, TreeError> {
        let info = self.try_dir_mut(dir)?;
        if info.is_dot_entry {
            return Err(TreeError::DotEntry(dir));
        }
        if info.read_state.is_terminal() {
            return Err(TreeError::AlreadySettled(dir));
        }
        Ok(info)
    }

    fn settled_by_exclusion(&self, dir: NodeIndex) -> Result<bool, TreeError> {
        let info = self.try_dir(dir)?;
        Ok(info.is_excluded && info.read_state.is_terminal())
    }

    /// A job started somewhere at `dir`: +1 on every strict ancestor.
    pub(crate) fn read_job_added(&mut self, dir: NodeIndex) {
        self.for_each_strict_ancestor(dir, |info| info.pending_read_jobs += 1);
    }

    /// The job at `dir` completed: -1 on every strict ancestor, whose
    /// totals are now stale.
    pub(crate) fn read_job_finished(&mut self, dir: NodeIndex) {
        self.for_each_strict_ancestor(dir, |info| {
            debug_assert!(info.pending_read_jobs > 0, "pending job underflow");
            info.pending_read_jobs = info.pending_read_jobs.saturating_sub(1);
            info.mark_dirty();
        });
    }

    /// The job at `dir` was cancelled. Same bookkeeping as a finished job.
    pub(crate) fn read_job_aborted(&mut self, dir: NodeIndex) {
        self.read_job_finished(dir);
    }

    fn for_each_strict_ancestor(&mut self, dir: NodeIndex, mut f: impl FnMut(&mut super::DirInfo)) {
        let mut current = self.node(dir).parent;
        while let Some(idx) = current {
            let node = self.node_mut(idx);
            if let Some(info) = node.dir_mut() {
                f(info);
            }
            current = node.parent;
        }
    }
}
