//! The single-file mutation workflow.
//!
//! A [`FileMutator`] takes a [`MutationRequest`] through
//! `Validating -> Staged -> Committed -> Pushed -> Done`. All work happens in a
//! [`StagingWorkspace`](quill_git::StagingWorkspace) that is discarded when the
//! run ends, so nothing is visible on the live repository until the single
//! compare-and-swap of the branch ref at push time. A failure at any step
//! ends in `Failed` with the branch untouched.
//!
//! Runs can be split in two: `prepare_*` stops after the commit is built and
//! hands back a [`PreparedMutation`], whose [`land`](PreparedMutation::land)
//! performs the push.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SubsecRound, Utc};
use quill_git::{Oid, StagingWorkspace};
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, info_span, warn};

use crate::branch_name::BranchName;
use crate::error::{Error, Result};
use crate::event::{EventSink, PushUpdateEvent};
use crate::identity::{IdentityOptions, ResolvedIdentities, User, UserDirectory, resolve_identities};
use crate::repository::Repository;
use crate::tree_path::{PathRejection, TreePath};

/// A request to change one file on a branch.
///
/// Empty strings are treated like absent values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Commit the caller based the change on; defaults to the branch tip.
    #[serde(default)]
    pub last_commit_id: Option<String>,
    /// Branch to read from; defaults to the repository's default branch.
    #[serde(default)]
    pub old_branch: Option<String>,
    /// Branch to write to; defaults to `old_branch`.
    #[serde(default)]
    pub new_branch: Option<String>,
    /// Path of the file inside the tree.
    pub tree_path: String,
    /// Commit message.
    #[serde(default)]
    pub message: Option<String>,
    /// Expected content hash of the file on the branch tip.
    #[serde(default)]
    pub sha: Option<String>,
    /// Author override.
    #[serde(default)]
    pub author: Option<IdentityOptions>,
    /// Committer override.
    #[serde(default)]
    pub committer: Option<IdentityOptions>,
}

impl MutationRequest {
    /// Request targeting `tree_path` with every option defaulted.
    pub fn new(tree_path: impl Into<String>) -> Self {
        Self {
            tree_path: tree_path.into(),
            ..Self::default()
        }
    }
}

/// How [`FileMutator::write_file`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// The path must not exist yet.
    Create,
    /// The path must already exist.
    Update,
}

/// Workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Checking the request against the repository.
    Validating,
    /// Building the new tree in a workspace.
    Staged,
    /// Commit object created, branch not yet moved.
    Committed,
    /// Branch moved.
    Pushed,
    /// Event emitted.
    Done,
    /// Aborted; the branch is unchanged.
    Failed,
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::Staged => "staged",
            Self::Committed => "committed",
            Self::Pushed => "pushed",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Cooperative cancellation shared between a caller and a running mutation.
///
/// Checked before every step up to the push. Once the branch has moved the
/// flag has no effect.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The commit a mutation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// Commit hash.
    pub sha: String,
    /// Tree hash.
    pub tree: String,
    /// Parent commit hashes.
    pub parents: Vec<String>,
    /// Commit message.
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    /// Author and committer timestamp.
    pub date: DateTime<Utc>,
}

/// Result of a mutation as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResponse {
    /// Normalized path that was changed.
    pub path: String,
    /// The new commit.
    pub commit: CommitSummary,
    /// Blob hash of the new content; `None` after a delete.
    pub content_sha: Option<String>,
}

/// A mutation that reached the branch.
#[derive(Debug)]
pub struct Landed {
    /// What changed.
    pub file: FileResponse,
    /// The push event describing the ref transition.
    pub event: PushUpdateEvent,
    /// Outcome of handing `event` to the sink. An error here does not undo
    /// the commit.
    pub delivery: Result<()>,
    /// States visited, in order.
    pub states: Vec<MutationState>,
}

#[derive(Debug, Clone, Copy)]
enum Change<'c> {
    Delete,
    Write { content: &'c [u8], mode: WriteMode },
}

impl Change<'_> {
    const fn verb(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Write {
                mode: WriteMode::Create,
                ..
            } => "create",
            Self::Write {
                mode: WriteMode::Update,
                ..
            } => "update",
        }
    }

    fn default_message(self, path: &TreePath) -> String {
        match self {
            Self::Delete => format!("Delete '{path}'"),
            Self::Write {
                mode: WriteMode::Create,
                ..
            } => format!("Add '{path}'"),
            Self::Write {
                mode: WriteMode::Update,
                ..
            } => format!("Update '{path}'"),
        }
    }
}

/// A request that passed validation.
struct Plan {
    old_branch: BranchName,
    new_branch: BranchName,
    path: TreePath,
    identities: ResolvedIdentities,
    sha: Option<String>,
    last_commit_id: Option<String>,
    message: String,
}

impl Plan {
    fn creates_branch(&self) -> bool {
        self.new_branch != self.old_branch
    }
}

#[derive(Debug, Default)]
struct Progress {
    states: Vec<MutationState>,
}

impl Progress {
    fn enter(&mut self, state: MutationState) {
        debug!(from = ?self.states.last(), to = %state, "state transition");
        self.states.push(state);
    }

    fn current(&self) -> MutationState {
        self.states
            .last()
            .copied()
            .unwrap_or(MutationState::Validating)
    }

    fn fail(&mut self, error: &Error) {
        let at = self.current();
        self.enter(MutationState::Failed);
        warn!(%error, state = %at, "mutation failed");
    }
}

/// Workspace and commit built by the first half of a run.
struct Built<'a> {
    workspace: StagingWorkspace<'a>,
    plan: Plan,
    tip: Oid,
    tree: Oid,
    commit: Oid,
    when: DateTime<Utc>,
    content_sha: Option<Oid>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn is_full_hash(id: &str) -> bool {
    id.len() == 40 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Applies single-file changes to a repository.
pub struct FileMutator<'a, D: ?Sized, S: ?Sized> {
    repo: &'a Repository,
    directory: &'a D,
    sink: &'a S,
    cancel: CancelFlag,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a, D, S> FileMutator<'a, D, S>
where
    D: UserDirectory + ?Sized,
    S: EventSink + ?Sized,
{
    /// Create a mutator that resolves identities in `directory` and reports
    /// pushes to `sink`.
    pub fn new(repo: &'a Repository, directory: &'a D, sink: &'a S) -> Self {
        Self {
            repo,
            directory,
            sink,
            cancel: CancelFlag::default(),
            timestamp: None,
        }
    }

    /// Attach a cancellation flag.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use a fixed commit timestamp instead of the current time.
    #[must_use]
    pub fn with_timestamp(mut self, when: DateTime<Utc>) -> Self {
        self.timestamp = Some(when);
        self
    }

    /// Delete `request.tree_path` on behalf of `doer`.
    ///
    /// # Errors
    /// Returns the error of the first step that fails. The branch is only
    /// modified when this returns `Ok`.
    pub fn delete_file(&self, doer: &User, request: &MutationRequest) -> Result<Landed> {
        self.prepare_delete(doer, request)?.land()
    }

    /// Create or replace `request.tree_path` with `content` on behalf of `doer`.
    ///
    /// # Errors
    /// Returns the error of the first step that fails. The branch is only
    /// modified when this returns `Ok`.
    pub fn write_file(
        &self,
        doer: &User,
        request: &MutationRequest,
        content: &[u8],
        mode: WriteMode,
    ) -> Result<Landed> {
        self.prepare_write(doer, request, content, mode)?.land()
    }

    /// Validate, stage and commit a deletion without touching the branch.
    ///
    /// # Errors
    /// Returns the error of the first step that fails.
    pub fn prepare_delete(
        &self,
        doer: &User,
        request: &MutationRequest,
    ) -> Result<PreparedMutation<'_, 'a, D, S>> {
        self.prepare(doer, request, Change::Delete)
    }

    /// Validate, stage and commit a write without touching the branch.
    ///
    /// # Errors
    /// Returns the error of the first step that fails.
    pub fn prepare_write(
        &self,
        doer: &User,
        request: &MutationRequest,
        content: &[u8],
        mode: WriteMode,
    ) -> Result<PreparedMutation<'_, 'a, D, S>> {
        self.prepare(doer, request, Change::Write { content, mode })
    }

    fn prepare(
        &self,
        doer: &User,
        request: &MutationRequest,
        change: Change<'_>,
    ) -> Result<PreparedMutation<'_, 'a, D, S>> {
        let span = info_span!(
            "mutation",
            op = change.verb(),
            path = %request.tree_path,
            repo = %self.repo.name()
        );

        let mut progress = Progress::default();
        let outcome = span.in_scope(|| self.build(doer, request, change, &mut progress));
        match outcome {
            Ok(built) => Ok(PreparedMutation {
                mutator: self,
                built,
                progress,
                span,
            }),
            Err(e) => {
                span.in_scope(|| progress.fail(&e));
                Err(e)
            }
        }
    }

    fn checkpoint(&self, progress: &Progress) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(progress.current()));
        }
        Ok(())
    }

    fn build(
        &self,
        doer: &User,
        request: &MutationRequest,
        change: Change<'_>,
        progress: &mut Progress,
    ) -> Result<Built<'a>> {
        progress.enter(MutationState::Validating);
        let plan = self.validate(doer, request, change)?;

        self.checkpoint(progress)?;
        progress.enter(MutationState::Staged);
        let mut workspace = self.repo.open_workspace()?;
        let (tip, content_sha) = self.stage(&mut workspace, &plan, change)?;

        self.checkpoint(progress)?;
        progress.enter(MutationState::Committed);
        let when = self.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(0);
        let tree = workspace.write_tree()?;
        let commit = workspace.commit_tree(
            &plan.identities.author.signature(when)?,
            &plan.identities.committer.signature(when)?,
            tree,
            &plan.message,
        )?;

        Ok(Built {
            workspace,
            plan,
            tip,
            tree,
            commit,
            when,
            content_sha,
        })
    }

    fn push(
        &self,
        built: Built<'a>,
        progress: &mut Progress,
    ) -> Result<(FileResponse, PushUpdateEvent)> {
        self.checkpoint(progress)?;
        let Built {
            workspace,
            plan,
            tip,
            tree,
            commit,
            when,
            content_sha,
        } = built;

        let expected = (!plan.creates_branch()).then_some(tip);
        self.repo.push(
            &workspace,
            plan.identities.pusher(),
            commit,
            &plan.new_branch,
            expected,
        )?;
        progress.enter(MutationState::Pushed);
        drop(workspace);

        let event = PushUpdateEvent::new(
            self.repo,
            &plan.new_branch,
            expected,
            commit,
            plan.identities.pusher(),
        );
        let file = FileResponse {
            path: plan.path.to_string(),
            commit: CommitSummary {
                sha: commit.to_string(),
                tree: tree.to_string(),
                parents: vec![tip.to_string()],
                message: plan.message,
                author_name: plan.identities.author.name.clone(),
                author_email: plan.identities.author.email.clone(),
                committer_name: plan.identities.committer.name.clone(),
                committer_email: plan.identities.committer.email.clone(),
                date: when,
            },
            content_sha: content_sha.map(|sha| sha.to_string()),
        };
        Ok((file, event))
    }

    fn validate(&self, doer: &User, request: &MutationRequest, change: Change<'_>) -> Result<Plan> {
        let old_branch = BranchName::new(
            non_empty(request.old_branch.as_ref()).unwrap_or_else(|| self.repo.default_branch()),
        )?;
        let new_branch = match non_empty(request.new_branch.as_ref()) {
            Some(name) => BranchName::new(name)?,
            None => old_branch.clone(),
        };

        if !self.repo.branch_exists(&old_branch) {
            return Err(Error::BranchNotFound(old_branch.to_string()));
        }

        let identities = resolve_identities(
            doer,
            request.author.as_ref(),
            request.committer.as_ref(),
            self.directory,
        );

        // A committer override must not lift the doer past a protection rule.
        if new_branch == old_branch {
            self.repo.check_push(&old_branch, doer)?;
            if identities.pusher().email != doer.email {
                self.repo.check_push(&old_branch, identities.pusher())?;
            }
        } else if self.repo.branch_exists(&new_branch) {
            return Err(Error::BranchAlreadyExists(new_branch.to_string()));
        }

        let path = TreePath::new(&request.tree_path)?;
        let message = non_empty(request.message.as_ref())
            .map_or_else(|| change.default_message(&path), str::to_string);

        Ok(Plan {
            old_branch,
            new_branch,
            path,
            identities,
            sha: non_empty(request.sha.as_ref()).map(str::to_ascii_lowercase),
            last_commit_id: non_empty(request.last_commit_id.as_ref()).map(str::to_ascii_lowercase),
            message,
        })
    }

    /// Clone, check the file against the caller's expectations and apply the
    /// change to the index. Returns the base tip and the new blob hash.
    fn stage(
        &self,
        workspace: &mut StagingWorkspace<'_>,
        plan: &Plan,
        change: Change<'_>,
    ) -> Result<(Oid, Option<Oid>)> {
        workspace.clone_branch(&plan.old_branch)?;
        workspace.load_index()?;
        let tip = workspace.last_commit()?;
        let path = plan.path.as_str();

        if let Some(given) = &plan.last_commit_id {
            self.ensure_unchanged_since(given, tip, path)?;
        }

        let tracked = workspace.is_tracked(path)?;
        match change {
            Change::Delete
            | Change::Write {
                mode: WriteMode::Update,
                ..
            } => {
                if !tracked {
                    return Err(Error::PathNotTracked(path.to_string()));
                }
            }
            Change::Write {
                mode: WriteMode::Create,
                ..
            } => {
                if tracked {
                    return Err(Error::FileAlreadyExists(path.to_string()));
                }
                ensure_creatable(workspace, &plan.path)?;
            }
        }

        if let Some(given) = &plan.sha {
            let current = workspace
                .tip_entry(path)?
                .map(|entry| entry.id.to_string())
                .unwrap_or_default();
            if *given != current {
                return Err(Error::ShaMismatch {
                    given: given.clone(),
                    current,
                });
            }
        }

        let content_sha = match change {
            Change::Delete => {
                workspace.remove_path(path)?;
                None
            }
            Change::Write { content, .. } => Some(workspace.write_path(path, content)?),
        };
        Ok((tip, content_sha))
    }

    /// Reject an edit based on `given` when the file differs between `given`
    /// and the current tip.
    fn ensure_unchanged_since(&self, given: &str, tip: Oid, path: &str) -> Result<()> {
        let invalid = || Error::InvalidCommitId(given.to_string());
        if !is_full_hash(given) {
            return Err(invalid());
        }
        let base: Oid = given.parse().map_err(|_| invalid())?;
        if base == tip {
            return Ok(());
        }

        let git = self.repo.git();
        git.find_commit(base).map_err(|_| invalid())?;
        let before = git.tree_entry(base, path)?.map(|entry| entry.id);
        let now = git.tree_entry(tip, path)?.map(|entry| entry.id);
        if before != now {
            return Err(Error::CommitIdMismatch {
                given: given.to_string(),
                current: tip.to_string(),
            });
        }
        debug!(%base, %tip, "base commit is stale but the file is unchanged");
        Ok(())
    }
}

/// A new file needs every leading component to be a directory (or absent),
/// and nothing may already live below it.
fn ensure_creatable(workspace: &StagingWorkspace<'_>, path: &TreePath) -> Result<()> {
    for parent in path.parents() {
        if workspace.is_tracked(parent)? {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: PathRejection::ParentIsFile(parent.to_string()),
            });
        }
    }
    if workspace.indexed_paths(path)?.next().is_some() {
        return Err(Error::InvalidPath {
            path: path.to_string(),
            reason: PathRejection::IsDirectory,
        });
    }
    Ok(())
}

impl<D: ?Sized, S: ?Sized> fmt::Debug for FileMutator<'_, D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMutator")
            .field("repo", &self.repo.name())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// A mutation committed in its workspace but not yet on the branch.
///
/// [`land`](Self::land) pushes the commit. Dropping it instead discards the
/// workspace and leaves the branch as it was.
#[must_use = "the commit is discarded unless the mutation is landed"]
pub struct PreparedMutation<'m, 'a, D: ?Sized, S: ?Sized> {
    mutator: &'m FileMutator<'a, D, S>,
    built: Built<'a>,
    progress: Progress,
    span: Span,
}

impl<D, S> PreparedMutation<'_, '_, D, S>
where
    D: UserDirectory + ?Sized,
    S: EventSink + ?Sized,
{
    /// The commit that [`land`](Self::land) will push.
    #[must_use]
    pub const fn commit_id(&self) -> Oid {
        self.built.commit
    }

    /// The branch tip the commit was built on.
    #[must_use]
    pub const fn base(&self) -> Oid {
        self.built.tip
    }

    /// Push the commit with a compare-and-swap against [`base`](Self::base),
    /// then report it to the sink.
    ///
    /// # Errors
    /// Returns [`Error::NonFastForward`] if the branch moved since the commit
    /// was built, [`Error::Cancelled`] if the run was cancelled, or the error
    /// of the push itself. Delivery failures are reported in
    /// [`Landed::delivery`] instead.
    pub fn land(self) -> Result<Landed> {
        let Self {
            mutator,
            built,
            mut progress,
            span,
        } = self;
        let _guard = span.enter();

        match mutator.push(built, &mut progress) {
            Ok((file, event)) => {
                progress.enter(MutationState::Done);
                let delivery = mutator.sink.deliver(&event);
                if let Err(e) = &delivery {
                    warn!(error = %e, ref_name = %event.ref_name, "push event not delivered");
                }
                info!(
                    commit = %file.commit.sha,
                    branch = %event.branch(),
                    "mutation landed"
                );
                Ok(Landed {
                    file,
                    event,
                    delivery,
                    states: progress.states,
                })
            }
            Err(e) => {
                progress.fail(&e);
                Err(e)
            }
        }
    }
}

impl<D: ?Sized, S: ?Sized> fmt::Debug for PreparedMutation<'_, '_, D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedMutation")
            .field("branch", &self.built.plan.new_branch)
            .field("base", &self.built.tip)
            .field("commit", &self.built.commit)
            .finish_non_exhaustive()
    }
}
