//! Push-update events and the sinks that carry them downstream.
//!
//! Once a commit has landed, the workflow describes the ref transition as a
//! [`PushUpdateEvent`] and hands it to an [`EventSink`]. Delivery is best
//! effort: the branch ref is the record of the mutation, the event is only a
//! notification of it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use quill_git::Oid;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::identity::User;
use crate::repository::Repository;

/// Ref prefix for branches.
pub const BRANCH_PREFIX: &str = "refs/heads/";

/// A ref transition caused by a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushUpdateEvent {
    /// Full ref name, e.g. `refs/heads/main`.
    pub ref_name: String,
    /// Previous tip; all zeros when the ref was created.
    pub old_commit_id: String,
    /// New tip.
    pub new_commit_id: String,
    /// Id of the user who pushed.
    pub pusher_id: u64,
    /// Name of the user who pushed.
    pub pusher_name: String,
    /// Repository owner.
    pub repo_owner: String,
    /// Repository name.
    pub repo_name: String,
}

impl PushUpdateEvent {
    /// Describe `branch` moving from `old` (`None` for creation) to `new`.
    #[must_use]
    pub fn new(repo: &Repository, branch: &str, old: Option<Oid>, new: Oid, pusher: &User) -> Self {
        Self {
            ref_name: format!("{BRANCH_PREFIX}{branch}"),
            old_commit_id: old.unwrap_or_else(Oid::zero).to_string(),
            new_commit_id: new.to_string(),
            pusher_id: pusher.id,
            pusher_name: pusher.name.clone(),
            repo_owner: repo.owner().to_string(),
            repo_name: repo.name().to_string(),
        }
    }

    /// Whether this event records the creation of the ref.
    #[must_use]
    pub fn is_creation(&self) -> bool {
        self.old_commit_id.bytes().all(|b| b == b'0')
    }

    /// Branch name without the `refs/heads/` prefix.
    #[must_use]
    pub fn branch(&self) -> &str {
        self.ref_name
            .strip_prefix(BRANCH_PREFIX)
            .unwrap_or(&self.ref_name)
    }
}

/// Destination for push events.
pub trait EventSink: Send + Sync {
    /// Hand `event` to downstream consumers.
    ///
    /// # Errors
    /// Returns [`Error::EventDelivery`] if the event could not be handed off.
    fn deliver(&self, event: &PushUpdateEvent) -> Result<()>;
}

impl<T: EventSink + ?Sized> EventSink for &T {
    fn deliver(&self, event: &PushUpdateEvent) -> Result<()> {
        (**self).deliver(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn deliver(&self, event: &PushUpdateEvent) -> Result<()> {
        (**self).deliver(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn deliver(&self, _event: &PushUpdateEvent) -> Result<()> {
        Ok(())
    }
}

/// Forwards events to an in-process async consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PushUpdateEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushUpdateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: &PushUpdateEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| Error::EventDelivery("event receiver closed".into()))
    }
}

/// Appends events to a file, one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    /// Create a sink writing to `path`. The file is created on first delivery.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonLinesSink {
    fn deliver(&self, event: &PushUpdateEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        // One write per event so concurrent appenders do not interleave lines.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(&line))
            .map_err(|e| Error::EventDelivery(format!("{}: {e}", self.path.display())))
    }
}
