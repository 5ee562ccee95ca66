/// A single node in the arena-allocated directory tree.
///
/// Nodes live in a flat arena owned by [`DirTree`](super::DirTree).
/// Parent and sibling relationships use [`NodeIndex`] handles rather than
/// pointers, so the parent back-reference carries no ownership and the
/// tree can be shared behind a single lock.
use super::entry::Entry;
use parking_lot::Mutex;
use std::time::SystemTime;

/// Display name of the synthetic node holding a directory's own files.
pub const DOT_ENTRY_NAME: &str = "<Files>";

/// Lightweight handle into the tree arena.
///
/// Handles are never reused: a deleted node's slot stays empty, so a stale
/// handle resolves to "not found" instead of aliasing a newer node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Create a new `NodeIndex` from a `usize`, panicking if it exceeds `u32::MAX`.
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    /// Return the index as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Progress of reading one directory level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadState {
    /// Discovered, waiting in the read queue.
    Queued,
    /// Read in progress; children may still arrive.
    Reading,
    /// Read completed without error.
    Finished,
    /// Cancelled on user request.
    Aborted,
    /// Read failed, e.g. permission denied.
    Error,
}

impl ReadState {
    /// `true` for the three states a directory never leaves.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Aborted | Self::Error)
    }

    #[inline]
    pub fn is_busy(self) -> bool {
        !self.is_terminal()
    }
}

/// How a directory read job ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReadOutcome {
    Ok,
    Error,
    Aborted,
}

impl From<ReadOutcome> for ReadState {
    fn from(outcome: ReadOutcome) -> Self {
        match outcome {
            ReadOutcome::Ok => ReadState::Finished,
            ReadOutcome::Error => ReadState::Error,
            ReadOutcome::Aborted => ReadState::Aborted,
        }
    }
}

/// Aggregate values of a subtree.
///
/// Sizes, blocks and mtime include the node's own entry; the counts never
/// include the node itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Totals {
    pub size: u64,
    pub blocks: u64,
    pub items: u64,
    pub sub_dirs: u64,
    pub files: u64,
    pub latest_mtime: SystemTime,
}

impl Totals {
    /// Totals of a node with no children.
    pub fn leaf(entry: &Entry) -> Self {
        Self {
            size: entry.size,
            blocks: entry.blocks,
            items: 0,
            sub_dirs: 0,
            files: 0,
            latest_mtime: entry.mtime,
        }
    }
}

/// Cached totals of a container plus the flag saying they are stale.
#[derive(Debug)]
pub(crate) struct Summary {
    pub(crate) totals: Totals,
    pub(crate) dirty: bool,
}

/// Container-only state: children, dot entry, scan bookkeeping and the
/// cached summary.
#[derive(Debug)]
pub struct DirInfo {
    pub(crate) first_child: Option<NodeIndex>,
    pub(crate) dot_entry: Option<NodeIndex>,
    pub(crate) is_dot_entry: bool,
    pub(crate) is_excluded: bool,
    pub(crate) is_mount_point: bool,
    /// Outstanding read jobs strictly below this container.
    pub(crate) pending_read_jobs: u32,
    pub(crate) read_state: ReadState,
    /// Whether this container's own read job is counted in its ancestors.
    pub(crate) job_registered: bool,
    pub(crate) locally_finalized: bool,
    pub(crate) subtree_finalized: bool,
    /// Set by `delete` on every container of the doomed subtree. Children
    /// unlinked from such a parent skip all ancestor bookkeeping.
    pub(crate) being_destroyed: bool,
    /// Directory children in the child list (dot entry not included).
    pub(crate) direct_sub_dirs: u32,
    /// Locked on read so two readers of a dirty container never interleave
    /// partial sums. Writers hold `&mut` and use `get_mut`.
    pub(crate) summary: Mutex<Summary>,
}

impl DirInfo {
    fn new(entry: &Entry, is_dot_entry: bool, read_state: ReadState) -> Self {
        Self {
            first_child: None,
            dot_entry: None,
            is_dot_entry,
            is_excluded: false,
            is_mount_point: false,
            pending_read_jobs: 0,
            read_state,
            job_registered: false,
            locally_finalized: false,
            subtree_finalized: false,
            being_destroyed: false,
            direct_sub_dirs: 0,
            summary: Mutex::new(Summary {
                totals: Totals::leaf(entry),
                dirty: false,
            }),
        }
    }

    #[inline]
    pub fn first_child(&self) -> Option<NodeIndex> {
        self.first_child
    }

    #[inline]
    pub fn dot_entry(&self) -> Option<NodeIndex> {
        self.dot_entry
    }

    #[inline]
    pub fn is_dot_entry(&self) -> bool {
        self.is_dot_entry
    }

    #[inline]
    pub fn is_excluded(&self) -> bool {
        self.is_excluded
    }

    #[inline]
    pub fn is_mount_point(&self) -> bool {
        self.is_mount_point
    }

    #[inline]
    pub fn pending_read_jobs(&self) -> u32 {
        self.pending_read_jobs
    }

    /// Own read state. Dot entries report their owner's state through
    /// [`DirTree::read_state`](super::DirTree::read_state) instead.
    #[inline]
    pub fn own_read_state(&self) -> ReadState {
        self.read_state
    }

    /// Mark the cached summary stale. Returns `true` if it was clean before.
    #[inline]
    pub(crate) fn mark_dirty(&mut self) -> bool {
        let summary = self.summary.get_mut();
        !std::mem::replace(&mut summary.dirty, true)
    }
}

/// Plain node or container node.
#[derive(Debug)]
pub enum NodeShape {
    /// File, symlink, device, fifo, socket.
    Plain,
    /// Directory, including dot entries.
    Container(DirInfo),
}

/// One node of the tree: its entry, its position, and its shape.
#[derive(Debug)]
pub struct FileNode {
    pub entry: Entry,
    /// `None` for the root and for unlinked nodes awaiting deletion.
    pub parent: Option<NodeIndex>,
    /// Next node in the parent's unordered child list.
    pub next_sibling: Option<NodeIndex>,
    pub shape: NodeShape,
}

impl FileNode {
    /// Wrap an entry: directories become containers, everything else plain.
    pub(crate) fn from_entry(entry: Entry, parent: Option<NodeIndex>) -> Self {
        let shape = if entry.is_dir() {
            NodeShape::Container(DirInfo::new(&entry, false, ReadState::Queued))
        } else {
            NodeShape::Plain
        };
        Self {
            entry,
            parent,
            next_sibling: None,
            shape,
        }
    }

    /// Create the dot entry serving `owner`.
    pub(crate) fn new_dot_entry(owner: NodeIndex, owner_state: ReadState) -> Self {
        let entry = Entry::directory(DOT_ENTRY_NAME);
        let dir = DirInfo::new(&entry, true, owner_state);
        Self {
            entry,
            parent: Some(owner),
            next_sibling: None,
            shape: NodeShape::Container(dir),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.entry.name.as_str()
    }

    /// Container-only state, `None` for plain nodes.
    #[inline]
    pub fn dir(&self) -> Option<&DirInfo> {
        match &self.shape {
            NodeShape::Container(dir) => Some(dir),
            NodeShape::Plain => None,
        }
    }

    #[inline]
    pub(crate) fn dir_mut(&mut self) -> Option<&mut DirInfo> {
        match &mut self.shape {
            NodeShape::Container(dir) => Some(dir),
            NodeShape::Plain => None,
        }
    }

    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self.shape, NodeShape::Container(_))
    }

    #[inline]
    pub fn is_dot_entry(&self) -> bool {
        self.dir().is_some_and(DirInfo::is_dot_entry)
    }

    /// A real directory: a container that is not a dot entry.
    #[inline]
    pub fn is_sub_dir(&self) -> bool {
        self.dir().is_some_and(|dir| !dir.is_dot_entry)
    }
}
