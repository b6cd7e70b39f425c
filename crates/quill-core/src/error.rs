//! Error types for quill-core.

use std::path::PathBuf;

use crate::mutation::MutationState;
use crate::tree_path::PathRejection;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of an [`Error`], telling callers how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request cannot succeed as written. Do not retry.
    Precondition,
    /// Someone else changed the branch or file first. Re-read and resubmit.
    Conflict,
    /// Infrastructure failure. The whole operation may be retried.
    Resource,
    /// The commit landed but downstream notification failed.
    Delivery,
}

/// Errors that can occur in quill-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Branch not found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// The requested new branch already exists.
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// Invalid branch name.
    #[error("invalid branch name '{name}': {reason}")]
    InvalidBranchName {
        /// The invalid name.
        name: String,
        /// Why the name is invalid.
        reason: String,
    },

    /// Invalid tree path.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The path as submitted.
        path: String,
        /// Which rule it broke.
        reason: PathRejection,
    },

    /// The acting user may not push to this branch directly.
    #[error("user '{user}' cannot commit directly to protected branch '{branch}'")]
    ProtectedBranch {
        /// Protected branch.
        branch: String,
        /// Email of the rejected user.
        user: String,
    },

    /// The target path is not tracked on the source branch.
    #[error("file does not exist: {0}")]
    PathNotTracked(String),

    /// A create targeted a path that is already tracked.
    #[error("file already exists: {0}")]
    FileAlreadyExists(String),

    /// A supplied commit id is malformed or unknown.
    #[error("invalid commit id: {0}")]
    InvalidCommitId(String),

    /// The caller's expected content hash does not match the branch tip.
    #[error("sha does not match [given: {given}, current: {current}]")]
    ShaMismatch {
        /// Hash supplied by the caller.
        given: String,
        /// Hash found on the branch (empty if the path is absent).
        current: String,
    },

    /// The file changed between the caller's base commit and the branch tip.
    #[error("file changed since commit {given} (branch is at {current})")]
    CommitIdMismatch {
        /// Commit the caller based the edit on.
        given: String,
        /// Current branch tip.
        current: String,
    },

    /// The branch moved between clone and push.
    #[error("branch '{branch}' was updated concurrently: expected {expected}, found {actual}")]
    NonFastForward {
        /// Branch being updated.
        branch: String,
        /// Tip the commit was built on.
        expected: String,
        /// Tip found at push time.
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

    /// The mutation was cancelled before it landed.
    #[error("mutation cancelled while {0}")]
    Cancelled(MutationState),

    /// A push event could not be handed to its sink.
    #[error("push event delivery failed: {0}")]
    EventDelivery(String),

    /// Settings file parsing error.
    #[error("failed to parse {file}: {message}")]
    SettingsParse { file: PathBuf, message: String },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Git operation error.
    #[error("git error: {0}")]
    Git(quill_git::Error),
}

impl Error {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BranchNotFound(_)
            | Self::BranchAlreadyExists(_)
            | Self::InvalidBranchName { .. }
            | Self::InvalidPath { .. }
            | Self::ProtectedBranch { .. }
            | Self::PathNotTracked(_)
            | Self::FileAlreadyExists(_)
            | Self::InvalidCommitId(_)
            | Self::Cancelled(_) => ErrorKind::Precondition,
            Self::ShaMismatch { .. }
            | Self::CommitIdMismatch { .. }
            | Self::NonFastForward { .. } => ErrorKind::Conflict,
            Self::EventDelivery(_) => ErrorKind::Delivery,
            Self::WorkspaceAllocation { .. }
            | Self::SettingsParse { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Git(_) => ErrorKind::Resource,
        }
    }

    /// Whether resubmitting (after re-reading state) can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Resource)
    }
}

impl From<quill_git::Error> for Error {
    fn from(err: quill_git::Error) -> Self {
        match err {
            quill_git::Error::BranchNotFound(name) => Self::BranchNotFound(name),
            quill_git::Error::PathNotTracked(path) => Self::PathNotTracked(path),
            quill_git::Error::NonFastForward {
                branch,
                expected,
                actual,
            } => Self::NonFastForward {
                branch,
                expected,
                actual,
            },
            quill_git::Error::WorkspaceAllocation { root, source } => {
                Self::WorkspaceAllocation { root, source }
            }
            other => Self::Git(other),
        }
    }
}
