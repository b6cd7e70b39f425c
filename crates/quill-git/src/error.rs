//! Error types for quill-git.

use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No repository at the given path.
    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    /// Branch not found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Path is not present in the staged index.
    #[error("path is not tracked: {0}")]
    PathNotTracked(String),

    /// The branch moved (or appeared) between clone and push.
    #[error("non-fast-forward update of '{branch}': expected {expected}, found {actual}")]
    NonFastForward {
        /// Branch that was being updated.
        branch: String,
        /// Tip the push was based on (`<none>` for branch creation).
        expected: String,
        /// Tip found at push time (`<none>` if the branch is gone).
        actual: String,
    },

    /// Scratch space for a staging workspace could not be obtained.
    #[error("could not allocate staging workspace under {root}: {source}")]
    WorkspaceAllocation {
        /// Directory the workspace was to be created in.
        root: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// A workspace step was called out of order.
    #[error("staging workspace misuse: {0}")]
    WorkspaceState(&'static str),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying git2 error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),
}
