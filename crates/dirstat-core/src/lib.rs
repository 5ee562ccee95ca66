/// Dirstat Core. The directory tree model and its scanner.
///
/// This crate holds all logic with no presentation dependencies.
///
/// # Modules
///
/// - [`model`]: Arena-allocated directory tree with cached subtree totals,
///   dot entries, and per-directory read state.
/// - [`scanner`]: Local scan coordinator: worker pool, single tree writer,
///   progress reporting.
/// - [`config`]: Scan configuration.
/// - [`exclude`]: Exclusion predicate consulted before reading a directory.
/// - [`error`]: Tree contract violations and scan failures.
pub mod config;
pub mod error;
pub mod exclude;
pub mod model;
pub mod scanner;

pub use config::ScanConfig;
pub use error::{ScanError, TreeError};
pub use exclude::{ExcludeRule, ExcludeRules};
pub use model::{DirTree, Entry, EntryKind, NodeIndex, ReadOutcome, ReadState, Totals};
