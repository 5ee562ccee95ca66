/// Dot-entry cleanup run when a directory level is finalized.
///
/// While a directory is being read, whether it will end up with any
/// subdirectories is unknown, so the dot entry may turn out empty or
/// pointless. Once the level has settled its shape is decided here:
///
/// - an empty dot entry is deleted;
/// - a dot entry in a directory without subdirectories is dissolved and its
///   files moved up into the directory;
/// - files that landed directly in a directory which does have
///   subdirectories (they arrived before the first subdirectory) are moved
///   into a new dot entry.
///
/// Cleanup only touches the container's immediate children and never
/// descends, so it is safe to run on any level regardless of what happens
/// below it.
use super::file_node::NodeIndex;
use super::file_tree::DirTree;
use crate::error::TreeError;
use tracing::debug;

impl DirTree {
    /// Finalize one directory level after its read has ended.
    ///
    /// Called by [`end_read`](Self::end_read); calling it again on the same
    /// directory is an error.
    pub fn finalize_local(&mut self, dir: NodeIndex) -> Result<(), TreeError> {
        let info = self.try_dir(dir)?;
        if info.is_dot_entry {
            return Err(TreeError::DotEntry(dir));
        }
        if !info.read_state.is_terminal() {
            return Err(TreeError::NotSettled(dir));
        }
        if info.locally_finalized {
            return Err(TreeError::AlreadyFinalized(dir));
        }

        self.cleanup_dot_entry(dir)?;
        self.dir_slot_mut(dir).locally_finalized = true;
        Ok(())
    }

    /// Run the cleanup once more on every directory of a settled subtree.
    ///
    /// Meant to be called once, when `pending_read_jobs(dir)` has reached
    /// zero. Returns the number of directories visited.
    pub fn finalize_all(&mut self, dir: NodeIndex) -> Result<usize, TreeError> {
        let info = self.try_dir(dir)?;
        if info.is_dot_entry {
            return Err(TreeError::DotEntry(dir));
        }
        if info.subtree_finalized {
            return Err(TreeError::AlreadyFinalized(dir));
        }
        if self.is_busy(dir) {
            return Err(TreeError::SubtreeBusy(dir));
        }

        let order = self.containers_post_order(dir);
        for &idx in &order {
            self.cleanup_dot_entry(idx)?;
            let info = self.dir_slot_mut(idx);
            info.locally_finalized = true;
            info.subtree_finalized = true;
        }
        debug!(?dir, directories = order.len(), "subtree finalized");
        Ok(order.len())
    }

    /// Returns `true` if the shape of `dir` changed.
    fn cleanup_dot_entry(&mut self, dir: NodeIndex) -> Result<bool, TreeError> {
        let info = self.try_dir(dir)?;
        let dot_entry = info.dot_entry;
        let has_sub_dirs = info.direct_sub_dirs > 0;

        if has_sub_dirs {
            let stray: Vec<NodeIndex> = self
                .children_iter(dir)
                .filter(|&child| !self.node(child).is_container())
                .collect();
            if !stray.is_empty() {
                debug!(?dir, files = stray.len(), "moving early files into dot entry");
                let dot = match dot_entry {
                    Some(dot) => dot,
                    None => self.create_dot_entry(dir),
                };
                for file in stray {
                    self.move_plain_child(file, dot)?;
                }
            } else {
                match dot_entry {
                    Some(dot) if self.first_child(dot).is_none() => {
                        debug!(?dir, "removing empty dot entry");
                        self.remove_subtree(dot)?;
                    }
                    _ => return Ok(false),
                }
            }
        } else {
            let Some(dot) = dot_entry else {
                return Ok(false);
            };
            let files = self.children(dot);
            debug!(?dir, files = files.len(), "dissolving dot entry");
            for file in files {
                self.move_plain_child(file, dir)?;
            }
            self.remove_subtree(dot)?;
        }

        self.mark_dirty_upwards(dir);
        Ok(true)
    }

    /// Move a plain node to another container. No read jobs can live below
    /// a plain node, so only the lists and dirty flags change.
    fn move_plain_child(&mut self, child: NodeIndex, new_parent: NodeIndex) -> Result<(), TreeError> {
        let node = self.try_node(child)?;
        if node.is_container() {
            return Err(TreeError::NotAContainer(child));
        }
        let old_parent = node.parent.ok_or(TreeError::NotLinked(child))?;
        self.detach_from_list(old_parent, child)?;
        self.link(new_parent, child);
        self.mark_dirty_upwards(old_parent);
        self.mark_dirty_upwards(new_parent);
        Ok(())
    }
}
