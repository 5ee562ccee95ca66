/// Error types for tree mutation and scanning.
use std::path::PathBuf;

use thiserror::Error;

use crate::model::NodeIndex;

/// A violated tree contract.
///
/// These are never data conditions: a scan that fails to read a directory
/// records that in the directory's read state instead. A `TreeError` means
/// the caller asked for something the tree cannot do without corrupting
/// its aggregates, and the operation was refused before any change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Handle does not resolve to a live node.
    #[error("node {0:?} does not exist")]
    NodeNotFound(NodeIndex),

    /// Operation requires a directory node.
    #[error("node {0:?} is not a container")]
    NotAContainer(NodeIndex),

    /// Excluded containers never receive children.
    #[error("container {0:?} is excluded")]
    ContainerExcluded(NodeIndex),

    /// Container has settled; late children would make its cleanup stale.
    #[error("container {0:?} has finished reading and accepts no more children")]
    ContainerSettled(NodeIndex),

    /// Node is not in its recorded parent's child list.
    #[error("node {node:?} is not a child of {parent:?}")]
    NotInParent { node: NodeIndex, parent: NodeIndex },

    /// Node has no parent to unlink from.
    #[error("node {0:?} is not linked into the tree")]
    NotLinked(NodeIndex),

    /// Deleting a node that is still linked.
    #[error("node {0:?} must be unlinked before it is deleted")]
    StillLinked(NodeIndex),

    /// The root can be neither unlinked nor deleted.
    #[error("node {0:?} is the tree root")]
    RootNode(NodeIndex),

    /// Dot entries hold non-directories only.
    #[error("cannot attach a directory to dot entry {0:?}")]
    DirectoryInDotEntry(NodeIndex),

    /// Operation is not valid on a dot entry.
    #[error("node {0:?} is a dot entry")]
    DotEntry(NodeIndex),

    /// Read state is already terminal.
    #[error("container {0:?} has already settled")]
    AlreadySettled(NodeIndex),

    /// Read job was already registered.
    #[error("container {0:?} already has a read job")]
    AlreadyQueued(NodeIndex),

    /// Finalizing twice.
    #[error("container {0:?} has already been finalized")]
    AlreadyFinalized(NodeIndex),

    /// Finalizing a container whose own read has not ended.
    #[error("container {0:?} is still reading")]
    NotSettled(NodeIndex),

    /// Finalizing a subtree with outstanding read jobs.
    #[error("subtree {0:?} still has outstanding read jobs")]
    SubtreeBusy(NodeIndex),

    /// Excluding a container that already holds children.
    #[error("container {0:?} already has children and cannot be excluded")]
    ExcludeNonEmpty(NodeIndex),

    /// Entry name is empty or contains a path separator.
    #[error("invalid entry name {0:?}")]
    InvalidName(String),
}

/// Errors that stop a scan from starting or running.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid or unreadable configuration.
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Worker pool or writer thread could not be started.
    #[error("Failed to start scanner: {message}")]
    Spawn { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
