/// Messages from read workers to the tree writer.
///
/// Workers never touch the tree. Everything they learn about a directory
/// travels through one of these, in order, on the event channel; the
/// writer applies them.
use crate::model::{Entry, NodeIndex, ReadOutcome};
use std::path::PathBuf;

#[derive(Debug)]
pub enum ScanEvent {
    /// A worker opened the directory.
    ReadStarted { dir: NodeIndex, path: PathBuf },

    /// One entry found in `dir`. `path` is the entry's real path; the
    /// entry name is lossy for names that are not valid UTF-8.
    EntryDiscovered {
        dir: NodeIndex,
        entry: Entry,
        path: PathBuf,
    },

    /// The worker is done with `dir`. `error` is set when the directory
    /// could not be listed.
    ReadFinished {
        dir: NodeIndex,
        outcome: ReadOutcome,
        error: Option<String>,
    },
}

impl ScanEvent {
    /// Directory the event belongs to.
    pub fn dir(&self) -> NodeIndex {
        match self {
            Self::ReadStarted { dir, .. }
            | Self::EntryDiscovered { dir, .. }
            | Self::ReadFinished { dir, .. } => *dir,
        }
    }
}
