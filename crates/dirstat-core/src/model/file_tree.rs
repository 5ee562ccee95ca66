/// Arena-backed directory tree with incremental ingestion.
///
/// All nodes live in a single `Vec`. Relationships between nodes use
/// `NodeIndex` (a thin `u32` wrapper) rather than heap pointers. Children
/// form an unordered singly-linked list through `first_child` /
/// `next_sibling`; a directory's dot entry is held separately and never
/// appears in that list.
///
/// Every mutating method takes `&mut self`, so wrapping the tree in a
/// `RwLock` gives the single serialised mutation path the scanner relies on.
/// Aggregate reads take `&self` (see `summary.rs`).
use super::entry::{Entry, EntryKind};
use super::file_node::{DirInfo, FileNode, NodeIndex};
use crate::error::TreeError;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use tracing::{debug, trace};

/// The tree of one scan.
#[derive(Debug)]
pub struct DirTree {
    /// Arena. Deleted nodes leave `None` behind; slots are never reused.
    nodes: Vec<Option<FileNode>>,

    root: NodeIndex,

    /// Number of occupied slots.
    live_nodes: usize,

    /// Number of container summaries recomputed so far.
    pub(crate) recalculations: AtomicU64,
}

impl DirTree {
    /// Create a tree holding only `root`.
    ///
    /// The root is always a container; its name is kept verbatim and may
    /// be a full path. It starts out `Queued` with no read job registered.
    pub fn new(root: Entry) -> Self {
        Self::with_capacity(root, 1)
    }

    /// Create a tree with pre-allocated room for `estimated_nodes` nodes.
    pub fn with_capacity(mut root: Entry, estimated_nodes: usize) -> Self {
        root.kind = EntryKind::Directory;
        let mut nodes = Vec::with_capacity(estimated_nodes.max(1));
        nodes.push(Some(FileNode::from_entry(root, None)));
        Self {
            nodes,
            root: NodeIndex(0),
            live_nodes: 1,
            recalculations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Get the node at `index`, or `None` if it was deleted.
    #[inline]
    pub fn get(&self, index: NodeIndex) -> Option<&FileNode> {
        self.nodes.get(index.idx()).and_then(Option::as_ref)
    }

    /// Get the node at the given index.
    ///
    /// Panics on a stale handle, like indexing a slice out of bounds.
    #[inline]
    pub fn node(&self, index: NodeIndex) -> &FileNode {
        match self.get(index) {
            Some(node) => node,
            None => panic!("stale NodeIndex {index:?}"),
        }
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> &mut FileNode {
        match self.nodes.get_mut(index.idx()).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("stale NodeIndex {index:?}"),
        }
    }

    pub(crate) fn try_node(&self, index: NodeIndex) -> Result<&FileNode, TreeError> {
        self.get(index).ok_or(TreeError::NodeNotFound(index))
    }

    pub(crate) fn try_dir(&self, index: NodeIndex) -> Result<&DirInfo, TreeError> {
        self.try_node(index)?
            .dir()
            .ok_or(TreeError::NotAContainer(index))
    }

    pub(crate) fn try_dir_mut(&mut self, index: NodeIndex) -> Result<&mut DirInfo, TreeError> {
        self.nodes
            .get_mut(index.idx())
            .and_then(Option::as_mut)
            .ok_or(TreeError::NodeNotFound(index))?
            .dir_mut()
            .ok_or(TreeError::NotAContainer(index))
    }

    /// Container state of a node already known to be a container.
    pub(crate) fn dir_slot_mut(&mut self, index: NodeIndex) -> &mut DirInfo {
        match self.node_mut(index).dir_mut() {
            Some(dir) => dir,
            None => panic!("{index:?} is not a container"),
        }
    }

    /// Number of live nodes, dot entries included.
    #[inline]
    pub fn len(&self) -> usize {
        self.live_nodes
    }

    /// A tree always holds its root, so this is never `true`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live_nodes == 0
    }

    fn alloc(&mut self, node: FileNode) -> NodeIndex {
        let idx = NodeIndex::new(self.nodes.len());
        self.nodes.push(Some(node));
        self.live_nodes += 1;
        idx
    }

    // ── Traversal ────────────────────────────────────────────────────────

    #[inline]
    pub fn parent(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.node(index).parent
    }

    /// First node of the child list. Plain nodes have none.
    #[inline]
    pub fn first_child(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.node(index).dir().and_then(DirInfo::first_child)
    }

    #[inline]
    pub fn next_sibling(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.node(index).next_sibling
    }

    #[inline]
    pub fn dot_entry(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.node(index).dir().and_then(DirInfo::dot_entry)
    }

    /// Iterate the child list (dot entry not included). Order is arbitrary.
    pub fn children_iter(&self, parent: NodeIndex) -> Children<'_> {
        Children {
            tree: self,
            next: self.first_child(parent),
        }
    }

    /// Get direct children of a node (unsorted, dot entry excluded).
    pub fn children(&self, parent: NodeIndex) -> Vec<NodeIndex> {
        self.children_iter(parent).collect()
    }

    /// Children plus the dot entry, directories first, then by total size
    /// descending.
    pub fn children_sorted_by_size(&self, parent: NodeIndex) -> Vec<NodeIndex> {
        let mut children = self.children(parent);
        children.extend(self.dot_entry(parent));
        children.sort_by_cached_key(|&idx| {
            let node = self.node(idx);
            (!node.is_container(), std::cmp::Reverse(self.total_size(idx)))
        });
        children
    }

    /// Strict ancestors of `index`, nearest first.
    pub fn ancestors(&self, index: NodeIndex) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(index),
        }
    }

    /// Reconstruct the full path of a node by walking up to the root.
    ///
    /// Dot entries are not directories on disk and add no component.
    pub fn full_path(&self, index: NodeIndex) -> PathBuf {
        let mut segments = Vec::new();
        let mut current = Some(index);
        while let Some(idx) = current {
            let node = self.node(idx);
            if !node.is_dot_entry() {
                segments.push(node.name());
            }
            current = node.parent;
        }
        segments.iter().rev().collect()
    }

    #[inline]
    pub fn is_dot_entry(&self, index: NodeIndex) -> bool {
        self.node(index).is_dot_entry()
    }

    #[inline]
    pub fn is_excluded(&self, index: NodeIndex) -> bool {
        self.node(index).dir().is_some_and(DirInfo::is_excluded)
    }

    #[inline]
    pub fn is_mount_point(&self, index: NodeIndex) -> bool {
        self.node(index).dir().is_some_and(DirInfo::is_mount_point)
    }

    /// Record whether `dir` is the root of a separate filesystem.
    pub fn set_mount_point(&mut self, dir: NodeIndex, mount_point: bool) -> Result<(), TreeError> {
        let info = self.try_dir_mut(dir)?;
        if info.is_dot_entry {
            return Err(TreeError::DotEntry(dir));
        }
        info.is_mount_point = mount_point;
        Ok(())
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Create a node for `entry` and attach it below `parent`.
    ///
    /// Directories always go into the child list. Other entries go into the
    /// parent's dot entry when it has one; one is created the first time a
    /// non-directory arrives at a container that already has a subdirectory.
    /// Passing a dot entry as `parent` attaches to it directly.
    ///
    /// Marks `parent` and every ancestor dirty.
    pub fn attach_child(&mut self, parent: NodeIndex, entry: Entry) -> Result<NodeIndex, TreeError> {
        validate_name(&entry.name)?;
        let target = self.ingestion_target(parent, entry.is_dir())?;
        trace!(parent = ?target, name = %entry.name, kind = ?entry.kind, "attach");
        let child = self.alloc(FileNode::from_entry(entry, Some(target)));
        self.link(target, child);
        self.mark_dirty_upwards(target);
        Ok(child)
    }

    /// Resolve which container a new entry lands in, refusing containers
    /// that may not receive children any more.
    fn ingestion_target(&mut self, parent: NodeIndex, is_dir: bool) -> Result<NodeIndex, TreeError> {
        let node = self.try_node(parent)?;
        let dir = node.dir().ok_or(TreeError::NotAContainer(parent))?;

        if dir.is_dot_entry {
            if is_dir {
                return Err(TreeError::DirectoryInDotEntry(parent));
            }
            let owner = node.parent.ok_or(TreeError::NotLinked(parent))?;
            self.check_accepts_children(owner)?;
            return Ok(parent);
        }

        self.check_accepts_children(parent)?;
        if is_dir {
            return Ok(parent);
        }
        let dir = self.try_dir(parent)?;
        let (dot_entry, has_sub_dirs) = (dir.dot_entry, dir.direct_sub_dirs > 0);
        match dot_entry {
            Some(dot) => Ok(dot),
            None if has_sub_dirs => Ok(self.create_dot_entry(parent)),
            None => Ok(parent),
        }
    }

    fn check_accepts_children(&self, dir: NodeIndex) -> Result<(), TreeError> {
        let info = self.try_dir(dir)?;
        if info.is_excluded {
            Err(TreeError::ContainerExcluded(dir))
        } else if info.read_state.is_terminal() {
            Err(TreeError::ContainerSettled(dir))
        } else {
            Ok(())
        }
    }

    /// Allocate the dot entry for `owner`, which must not have one yet.
    pub(crate) fn create_dot_entry(&mut self, owner: NodeIndex) -> NodeIndex {
        let state = self.dir_slot_mut(owner).read_state;
        let dot = self.alloc(FileNode::new_dot_entry(owner, state));
        self.dir_slot_mut(owner).dot_entry = Some(dot);
        debug!(?owner, ?dot, "created dot entry");
        dot
    }

    /// Prepend `child` to `parent`'s child list. O(1).
    pub(crate) fn link(&mut self, parent: NodeIndex, child: NodeIndex) {
        let old_first = self.dir_slot_mut(parent).first_child;
        let child_node = self.node_mut(child);
        child_node.next_sibling = old_first;
        child_node.parent = Some(parent);
        let is_sub_dir = child_node.is_sub_dir();

        let dir = self.dir_slot_mut(parent);
        dir.first_child = Some(child);
        if is_sub_dir {
            dir.direct_sub_dirs += 1;
        }
    }

    /// Take `child` out of `parent`'s child list (or dot entry slot) without
    /// any bookkeeping beyond the list itself. O(children).
    pub(crate) fn detach_from_list(&mut self, parent: NodeIndex, child: NodeIndex) -> Result<(), TreeError> {
        let dir = self.try_dir(parent)?;
        if dir.dot_entry == Some(child) {
            self.dir_slot_mut(parent).dot_entry = None;
        } else {
            let mut prev = None;
            let mut current = dir.first_child;
            while let Some(idx) = current {
                if idx == child {
                    break;
                }
                prev = Some(idx);
                current = self.node(idx).next_sibling;
            }
            if current.is_none() {
                return Err(TreeError::NotInParent {
                    node: child,
                    parent,
                });
            }

            let next = self.node(child).next_sibling;
            let is_sub_dir = self.node(child).is_sub_dir();
            match prev {
                Some(prev) => self.node_mut(prev).next_sibling = next,
                None => self.dir_slot_mut(parent).first_child = next,
            }
            if is_sub_dir {
                self.dir_slot_mut(parent).direct_sub_dirs -= 1;
            }
        }

        let node = self.node_mut(child);
        node.parent = None;
        node.next_sibling = None;
        Ok(())
    }

    /// Remove `node` from its parent.
    ///
    /// Read jobs still outstanding inside the detached subtree are taken off
    /// every former ancestor's pending count, and every former ancestor is
    /// marked dirty. The node stays allocated until [`delete`](Self::delete).
    pub fn unlink(&mut self, node: NodeIndex) -> Result<(), TreeError> {
        if node == self.root {
            return Err(TreeError::RootNode(node));
        }
        let target = self.try_node(node)?;
        let parent = target.parent.ok_or(TreeError::NotLinked(node))?;
        let outstanding = target.dir().map_or(0, |dir| {
            let own = dir.job_registered && dir.read_state.is_busy();
            dir.pending_read_jobs + u32::from(own)
        });
        let parent_destroyed = self.try_dir(parent)?.being_destroyed;

        self.detach_from_list(parent, node)?;
        if parent_destroyed {
            return Ok(());
        }

        if outstanding > 0 {
            let mut current = Some(parent);
            while let Some(idx) = current {
                let ancestor = self.node_mut(idx);
                if let Some(dir) = ancestor.dir_mut() {
                    dir.pending_read_jobs = dir.pending_read_jobs.saturating_sub(outstanding);
                }
                current = ancestor.parent;
            }
        }
        self.mark_dirty_upwards(parent);
        debug!(?node, ?parent, outstanding, "unlinked");
        Ok(())
    }

    /// Free an unlinked node and its whole subtree. Returns the number of
    /// nodes freed.
    pub fn delete(&mut self, node: NodeIndex) -> Result<usize, TreeError> {
        if node == self.root {
            return Err(TreeError::RootNode(node));
        }
        if self.try_node(node)?.parent.is_some() {
            return Err(TreeError::StillLinked(node));
        }

        let mut doomed = Vec::new();
        let mut stack = vec![node];
        while let Some(idx) = stack.pop() {
            doomed.push(idx);
            let first_child = match self.node_mut(idx).dir_mut() {
                Some(dir) => {
                    dir.being_destroyed = true;
                    stack.extend(dir.dot_entry);
                    dir.first_child
                }
                None => None,
            };
            let mut child = first_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.node(c).next_sibling;
            }
        }

        // Children before parents; each one leaves a parent that is being
        // destroyed, so no ancestor bookkeeping runs.
        for &idx in doomed.iter().rev() {
            if idx != node {
                self.unlink(idx)?;
            }
            self.nodes[idx.idx()] = None;
            self.live_nodes -= 1;
        }
        trace!(?node, freed = doomed.len(), "deleted subtree");
        Ok(doomed.len())
    }

    /// Unlink and delete in one step.
    pub fn remove_subtree(&mut self, node: NodeIndex) -> Result<usize, TreeError> {
        self.unlink(node)?;
        self.delete(node)
    }

    /// Mark `from` and every ancestor dirty.
    ///
    /// Stops at the first container that is already dirty: a dirty
    /// container's ancestors are always dirty too, because a summary is only
    /// ever cleaned by recomputing it, which cleans every descendant first.
    pub(crate) fn mark_dirty_upwards(&mut self, from: NodeIndex) {
        let mut current = Some(from);
        while let Some(idx) = current {
            let node = self.node_mut(idx);
            if let Some(dir) = node.dir_mut() {
                if !dir.mark_dirty() {
                    break;
                }
            }
            current = node.parent;
        }
    }

    /// Containers below and including `dir`, dot entries excluded, children
    /// before parents.
    pub(crate) fn containers_post_order(&self, dir: NodeIndex) -> Vec<NodeIndex> {
        let mut order = Vec::new();
        let mut stack = vec![dir];
        while let Some(idx) = stack.pop() {
            if !self.node(idx).is_sub_dir() {
                continue;
            }
            order.push(idx);
            stack.extend(self.children_iter(idx));
        }
        // Pre-order with parents before children; reversing puts every
        // child ahead of its parent.
        order.reverse();
        order
    }
}

/// Iterator over a container's child list.
pub struct Children<'a> {
    tree: &'a DirTree,
    next: Option<NodeIndex>,
}

impl Iterator for Children<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let current = self.next?;
        self.next = self.tree.node(current).next_sibling;
        Some(current)
    }
}

/// Iterator from a node's parent up to the root.
pub struct Ancestors<'a> {
    tree: &'a DirTree,
    next: Option<NodeIndex>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<NodeIndex> {
        let current = self.next?;
        self.next = self.tree.node(current).parent;
        Some(current)
    }
}

fn validate_name(name: &str) -> Result<(), TreeError> {
    if name.is_empty() || name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        return Err(TreeError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReadState;

    fn reading_tree() -> DirTree {
        let mut tree = DirTree::new(Entry::directory("/data"));
        tree.begin_read(tree.root()).unwrap();
        tree
    }

    #[test]
    fn test_attach_links_into_child_list() {
        let mut tree = reading_tree();
        let root = tree.root();
        let a = tree.attach_child(root, Entry::file("a", 1, 1)).unwrap();
        let b = tree.attach_child(root, Entry::file("b", 2, 1)).unwrap();

        let mut children = tree.children(root);
        children.sort();
        assert_eq!(children, vec![a, b]);
        assert_eq!(tree.parent(a), Some(root));
        assert_eq!(tree.dot_entry(root), None);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_file_after_subdir_goes_to_dot_entry() {
        let mut tree = reading_tree();
        let root = tree.root();
        let sub = tree.attach_child(root, Entry::directory("sub")).unwrap();
        let file = tree.attach_child(root, Entry::file("f", 10, 1)).unwrap();

        let dot = tree.dot_entry(root).expect("dot entry created");
        assert!(tree.is_dot_entry(dot));
        assert_eq!(tree.parent(file), Some(dot));
        assert_eq!(tree.children(root), vec![sub]);
        assert_eq!(tree.read_state(dot), ReadState::Reading);
    }

    #[test]
    fn test_directory_into_dot_entry_is_refused() {
        let mut tree = reading_tree();
        let root = tree.root();
        tree.attach_child(root, Entry::directory("sub")).unwrap();
        tree.attach_child(root, Entry::file("f", 1, 1)).unwrap();
        let dot = tree.dot_entry(root).unwrap();

        let err = tree.attach_child(dot, Entry::directory("nested")).unwrap_err();
        assert_eq!(err, TreeError::DirectoryInDotEntry(dot));
    }

    #[test]
    fn test_attach_to_plain_node_fails() {
        let mut tree = reading_tree();
        let file = tree.attach_child(tree.root(), Entry::file("f", 1, 1)).unwrap();
        let err = tree.attach_child(file, Entry::file("g", 1, 1)).unwrap_err();
        assert_eq!(err, TreeError::NotAContainer(file));
    }

    #[test]
    fn test_invalid_names_are_refused() {
        let mut tree = reading_tree();
        let root = tree.root();
        assert!(matches!(
            tree.attach_child(root, Entry::file("a/b", 1, 1)),
            Err(TreeError::InvalidName(_))
        ));
        assert!(matches!(
            tree.attach_child(root, Entry::file("", 1, 1)),
            Err(TreeError::InvalidName(_))
        ));
    }

    #[test]
    fn test_unlink_and_delete() {
        let mut tree = reading_tree();
        let root = tree.root();
        let sub = tree.attach_child(root, Entry::directory("sub")).unwrap();
        tree.begin_read(sub).unwrap();
        tree.attach_child(sub, Entry::file("x", 5, 1)).unwrap();
        tree.attach_child(sub, Entry::file("y", 5, 1)).unwrap();
        assert_eq!(tree.len(), 4);

        assert_eq!(tree.delete(sub), Err(TreeError::StillLinked(sub)));
        tree.unlink(sub).unwrap();
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.unlink(sub), Err(TreeError::NotLinked(sub)));

        assert_eq!(tree.delete(sub), Ok(3));
        assert_eq!(tree.len(), 1);
        assert!(tree.get(sub).is_none());
        assert_eq!(tree.unlink(sub), Err(TreeError::NodeNotFound(sub)));
    }

    #[test]
    fn test_delete_tears_down_nested_subtree() {
        let mut tree = reading_tree();
        let root = tree.root();
        let sub = tree.attach_child(root, Entry::directory("sub")).unwrap();
        tree.begin_read(sub).unwrap();
        let inner = tree.attach_child(sub, Entry::directory("inner")).unwrap();
        tree.queue_read(inner).unwrap();
        tree.attach_child(sub, Entry::file("f", 5, 1)).unwrap();
        let dot = tree.dot_entry(sub).unwrap();
        assert_eq!(tree.pending_read_jobs(root), 2);

        assert_eq!(tree.remove_subtree(sub), Ok(4));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.pending_read_jobs(root), 0);
        assert_eq!(tree.total_items(root), 0);
        for gone in [sub, inner, dot] {
            assert!(tree.get(gone).is_none());
        }
        assert_eq!(
            tree.attach_child(sub, Entry::file("late", 1, 1)),
            Err(TreeError::NodeNotFound(sub))
        );
        assert_eq!(tree.begin_read(inner), Err(TreeError::NodeNotFound(inner)));
        assert!(tree.is_busy(root), "root itself is still reading");
    }

    #[test]
    fn test_unlink_missing_from_parent_list() {
        let mut tree = reading_tree();
        let root = tree.root();
        let a = tree.attach_child(root, Entry::file("a", 1, 1)).unwrap();
        // Corrupt the back-reference: `a` now claims a parent whose list
        // does not contain it.
        let other = tree.attach_child(root, Entry::directory("other")).unwrap();
        tree.node_mut(a).parent = Some(other);

        assert_eq!(
            tree.unlink(a),
            Err(TreeError::NotInParent {
                node: a,
                parent: other
            })
        );
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut tree = reading_tree();
        let root = tree.root();
        assert_eq!(tree.unlink(root), Err(TreeError::RootNode(root)));
        assert_eq!(tree.delete(root), Err(TreeError::RootNode(root)));
    }

    #[test]
    fn test_full_path_skips_dot_entry() {
        let mut tree = reading_tree();
        let root = tree.root();
        let users = tree.attach_child(root, Entry::directory("users")).unwrap();
        let file = tree.attach_child(root, Entry::file("notes.txt", 50, 1)).unwrap();
        tree.begin_read(users).unwrap();
        let inner = tree.attach_child(users, Entry::file("test.txt", 50, 1)).unwrap();

        assert!(tree.dot_entry(root).is_some());
        assert_eq!(tree.full_path(file), PathBuf::from("/data/notes.txt"));
        assert_eq!(tree.full_path(inner), PathBuf::from("/data/users/test.txt"));
    }

    #[test]
    fn test_children_sorted() {
        let mut tree = reading_tree();
        let root = tree.root();
        let small = tree.attach_child(root, Entry::file("small.txt", 10, 1)).unwrap();
        let big = tree.attach_child(root, Entry::file("big.bin", 1000, 2)).unwrap();
        let dir = tree.attach_child(root, Entry::directory("folder")).unwrap();

        let sorted = tree.children_sorted_by_size(root);
        // Directory first, then big file, then small file.
        assert_eq!(sorted, vec![dir, big, small]);
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let mut tree = reading_tree();
        let root = tree.root();
        let a = tree.attach_child(root, Entry::directory("a")).unwrap();
        tree.begin_read(a).unwrap();
        let b = tree.attach_child(a, Entry::directory("b")).unwrap();
        assert_eq!(tree.ancestors(b).collect::<Vec<_>>(), vec![a, root]);
        assert_eq!(tree.ancestors(root).count(), 0);
    }
}
