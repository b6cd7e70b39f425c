//! # quill-git
//!
//! Git layer for Quill, built on git2-rs.
//! Provides read access to the live repository, atomic branch updates,
//! and disposable staging workspaces used to build commits in isolation.

mod error;
mod repository;
mod workspace;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use git2::{Oid, Signature, Time};
pub use repository::{Repository, TreeEntryInfo};
pub use workspace::StagingWorkspace;

#[doc(hidden)]
pub use workspace::blob_entry;
