//! Author and committer resolution.
//!
//! A request may carry author/committer overrides that name a user by email.
//! Resolution never fails: an override that matches nobody falls back to the
//! acting user. The result is an immutable [`ResolvedIdentities`] threaded
//! through the rest of the workflow.

use chrono::{DateTime, Utc};
use quill_git::{Signature, Time};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// A known user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    pub id: u64,
    /// Display name used in commit signatures.
    pub name: String,
    /// Email used in commit signatures and for lookups.
    pub email: String,
}

impl User {
    /// Create a user.
    pub fn new(id: u64, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
        }
    }

    /// Git signature for this user at `when`.
    ///
    /// # Errors
    /// Returns error if git rejects the name or email (e.g. empty).
    pub fn signature(&self, when: DateTime<Utc>) -> Result<Signature<'static>> {
        Signature::new(&self.name, &self.email, &Time::new(when.timestamp(), 0))
            .map_err(|e| quill_git::Error::from(e).into())
    }
}

/// An author or committer override from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityOptions {
    /// Requested display name.
    #[serde(default)]
    pub name: String,
    /// Email of the user to attribute the change to.
    #[serde(default)]
    pub email: String,
}

impl IdentityOptions {
    /// Override that names a user by email only.
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            email: email.into(),
        }
    }
}

/// Lookup of users by email.
pub trait UserDirectory {
    /// Find the user owning `email`, if any.
    fn find_by_email(&self, email: &str) -> Option<User>;
}

/// A fixed, in-memory user list.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: Vec<User>,
}

impl StaticDirectory {
    /// Create a directory from a user list.
    #[must_use]
    pub const fn new(users: Vec<User>) -> Self {
        Self { users }
    }

    /// Add a user.
    #[must_use]
    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }
}

impl UserDirectory for StaticDirectory {
    fn find_by_email(&self, email: &str) -> Option<User> {
        self.users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned()
    }
}

/// Who authored and who commits a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentities {
    /// Commit author.
    pub author: User,
    /// Commit committer; also the pusher recorded in push events.
    pub committer: User,
}

impl ResolvedIdentities {
    /// Identity recorded as the pusher.
    #[must_use]
    pub const fn pusher(&self) -> &User {
        &self.committer
    }
}

fn lookup<D: UserDirectory + ?Sized>(
    role: &str,
    doer: &User,
    requested: Option<&IdentityOptions>,
    directory: &D,
) -> Option<User> {
    let requested = requested.filter(|opts| !opts.email.trim().is_empty())?;
    let email = requested.email.trim();
    Some(directory.find_by_email(email).unwrap_or_else(|| {
        debug!(%role, %email, "no user for override, using acting user");
        doer.clone()
    }))
}

/// Resolve author and committer for a change made by `doer`.
///
/// - An override with a non-empty email resolves to the matching user, or to
///   `doer` when nobody matches.
/// - Without a resolved author the author is the committer (or `doer`).
/// - Without a resolved committer the committer is the author.
pub fn resolve_identities<D: UserDirectory + ?Sized>(
    doer: &User,
    author: Option<&IdentityOptions>,
    committer: Option<&IdentityOptions>,
    directory: &D,
) -> ResolvedIdentities {
    let committer = lookup("committer", doer, committer, directory);
    let author = lookup("author", doer, author, directory);

    let author = author.unwrap_or_else(|| committer.clone().unwrap_or_else(|| doer.clone()));
    let committer = committer.unwrap_or_else(|| author.clone());

    ResolvedIdentities { author, committer }
}
