/// Data model: entries, the arena tree, and everything derived from it.
///
/// The tree itself is split by concern; each file adds an `impl DirTree`
/// block:
///
/// - `file_tree`: arena, ingestion, unlink/delete, traversal.
/// - `summary`: cached aggregate totals.
/// - `read_state`: per-directory read state and pending-job counters.
/// - `dot_entry`: dot-entry cleanup on finalization.
pub mod entry;
pub mod file_node;
pub mod file_tree;
pub mod size;

mod dot_entry;
mod read_state;
mod summary;

pub use entry::{Entry, EntryKind, BLOCK_SIZE};
pub use file_node::{
    DirInfo, FileNode, NodeIndex, NodeShape, ReadOutcome, ReadState, Totals, DOT_ENTRY_NAME,
};
pub use file_tree::{Ancestors, Children, DirTree};
