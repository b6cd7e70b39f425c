//! # quill-core
//!
//! Core library for Quill: validated request types, identity resolution,
//! repository settings, push events and the single-file mutation workflow
//! that lands a commit on a branch with optimistic concurrency control.

pub mod branch_name;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod mutation;
pub mod repository;
pub mod tree_path;

#[cfg(test)]
mod test_support;

pub use branch_name::BranchName;
pub use config::RepoSettings;
pub use error::{Error, ErrorKind, Result};
pub use event::{ChannelSink, EventSink, JsonLinesSink, NullSink, PushUpdateEvent};
pub use identity::{IdentityOptions, ResolvedIdentities, StaticDirectory, User, UserDirectory};
pub use mutation::{
    CancelFlag, CommitSummary, FileMutator, FileResponse, Landed, MutationRequest, MutationState,
    PreparedMutation, WriteMode,
};
pub use repository::Repository;
pub use tree_path::{PathCheck, PathRejection, TreePath};
