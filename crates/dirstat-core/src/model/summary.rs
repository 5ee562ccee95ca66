/// Cached subtree totals with lazy recomputation.
///
/// Mutations mark a container and its ancestors dirty; nothing is summed
/// until somebody asks. A read of a dirty container does one pass over its
/// direct children and its dot entry, asking each child container for its
/// own (possibly also recomputed) totals, then caches the result.
///
/// Reads take `&DirTree`, so any number of readers may share the tree. The
/// per-container summary mutex is what stops two readers from recomputing
/// the same container at once; locks are always taken parent before child.
use super::file_node::{DirInfo, FileNode, NodeIndex, Totals};
use super::file_tree::DirTree;
use std::sync::atomic::Ordering;

impl DirTree {
    /// All six aggregate values of `index` in one call.
    ///
    /// For a plain node these are its own size, blocks and mtime with zero
    /// counts.
    pub fn totals(&self, index: NodeIndex) -> Totals {
        let node = self.node(index);
        let Some(dir) = node.dir() else {
            return Totals::leaf(&node.entry);
        };

        let mut summary = dir.summary.lock();
        if summary.dirty {
            summary.totals = self.recalc(node, dir);
            summary.dirty = false;
            self.recalculations.fetch_add(1, Ordering::Relaxed);
        }
        summary.totals
    }

    fn recalc(&self, node: &FileNode, dir: &DirInfo) -> Totals {
        let mut totals = Totals::leaf(&node.entry);
        if dir.is_excluded {
            return totals;
        }

        for child in self.children_iter_from(dir.first_child) {
            let sub = self.totals(child);
            totals.size += sub.size;
            totals.blocks += sub.blocks;
            totals.items += 1 + sub.items;
            totals.sub_dirs += sub.sub_dirs;
            totals.files += sub.files;
            if self.node(child).is_sub_dir() {
                totals.sub_dirs += 1;
            } else {
                totals.files += 1;
            }
            totals.latest_mtime = totals.latest_mtime.max(sub.latest_mtime);
        }

        // The dot entry itself is neither an item nor a subdirectory; only
        // what it holds counts.
        if let Some(dot) = dir.dot_entry {
            let sub = self.totals(dot);
            totals.size += sub.size;
            totals.blocks += sub.blocks;
            totals.items += sub.items;
            totals.sub_dirs += sub.sub_dirs;
            totals.files += sub.files;
            totals.latest_mtime = totals.latest_mtime.max(sub.latest_mtime);
        }

        totals
    }

    fn children_iter_from(&self, first: Option<NodeIndex>) -> impl Iterator<Item = NodeIndex> + '_ {
        std::iter::successors(first, move |&idx| self.node(idx).next_sibling)
    }

    /// Total size in bytes, including the node's own entry.
    pub fn total_size(&self, index: NodeIndex) -> u64 {
        self.totals(index).size
    }

    /// Total allocated blocks, including the node's own entry.
    pub fn total_blocks(&self, index: NodeIndex) -> u64 {
        self.totals(index).blocks
    }

    /// Number of descendants, not counting the node itself or dot entries.
    pub fn total_items(&self, index: NodeIndex) -> u64 {
        self.totals(index).items
    }

    /// Number of descendant directories, dot entries excluded.
    pub fn total_sub_dirs(&self, index: NodeIndex) -> u64 {
        self.totals(index).sub_dirs
    }

    /// Number of descendant non-directories.
    pub fn total_files(&self, index: NodeIndex) -> u64 {
        self.totals(index).files
    }

    pub fn latest_mtime(&self, index: NodeIndex) -> std::time::SystemTime {
        self.totals(index).latest_mtime
    }

    /// `true` if the cached totals of `index` are stale. Plain nodes are
    /// never dirty.
    pub fn is_dirty(&self, index: NodeIndex) -> bool {
        self.node(index)
            .dir()
            .is_some_and(|dir| dir.summary.lock().dirty)
    }

    /// How many container summaries have been recomputed over the tree's
    /// lifetime.
    pub fn recalculations(&self) -> u64 {
        self.recalculations.load(Ordering::Relaxed)
    }
}
