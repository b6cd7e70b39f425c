//! The repository entity: a live git repository plus its settings.

use std::path::Path;

use quill_git::{Oid, StagingWorkspace};

use crate::config::RepoSettings;
use crate::error::{Error, Result};
use crate::identity::User;

/// A repository that mutations are applied to.
#[derive(Debug)]
pub struct Repository {
    git: quill_git::Repository,
    settings: RepoSettings,
    name: String,
}

impl Repository {
    /// Settings file name inside the git directory.
    pub const SETTINGS_FILE: &'static str = "quill.toml";

    /// Open the repository at `path` and load `<git dir>/quill.toml`.
    ///
    /// # Errors
    /// Returns error if no repository is found or the settings are malformed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let git = quill_git::Repository::open(path)?;
        let settings = RepoSettings::load(git.git_dir().join(Self::SETTINGS_FILE))?;
        Ok(Self::with_settings(git, settings))
    }

    /// Wrap an opened git repository with explicit settings.
    #[must_use]
    pub fn with_settings(git: quill_git::Repository, settings: RepoSettings) -> Self {
        let name = if settings.repository.name.is_empty() {
            infer_name(git.git_dir())
        } else {
            settings.repository.name.clone()
        };
        Self {
            git,
            settings,
            name,
        }
    }

    /// Underlying git repository.
    #[must_use]
    pub const fn git(&self) -> &quill_git::Repository {
        &self.git
    }

    /// Loaded settings.
    #[must_use]
    pub const fn settings(&self) -> &RepoSettings {
        &self.settings
    }

    /// Owning user or organisation.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.settings.repository.owner
    }

    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Branch used when a request names none.
    #[must_use]
    pub fn default_branch(&self) -> &str {
        &self.settings.repository.default_branch
    }

    /// Check if a branch exists.
    #[must_use]
    pub fn branch_exists(&self, name: &str) -> bool {
        self.git.branch_exists(name)
    }

    /// Whether `user` is barred from pushing directly to `branch`.
    #[must_use]
    pub fn is_protected_for_push(&self, branch: &str, user: &User) -> bool {
        self.settings.is_protected_for_push(branch, &user.email)
    }

    /// Fail with [`Error::ProtectedBranch`] unless `user` may push to `branch`.
    ///
    /// # Errors
    /// Returns [`Error::ProtectedBranch`] when the push is not allowed.
    pub fn check_push(&self, branch: &str, user: &User) -> Result<()> {
        if self.is_protected_for_push(branch, user) {
            return Err(Error::ProtectedBranch {
                branch: branch.to_string(),
                user: user.email.clone(),
            });
        }
        Ok(())
    }

    /// Allocate a staging workspace under the configured temp root.
    ///
    /// # Errors
    /// Returns [`Error::WorkspaceAllocation`] if no scratch space is available.
    pub fn open_workspace(&self) -> Result<StagingWorkspace<'_>> {
        Ok(StagingWorkspace::open(
            &self.git,
            self.settings.workspace.temp_root.as_deref(),
        )?)
    }

    /// Land `commit` from `workspace` on `branch` on behalf of `actor`.
    ///
    /// `expected` is the tip the commit was built on, or `None` to create the
    /// branch.
    ///
    /// # Errors
    /// Returns [`Error::ProtectedBranch`] if `actor` may not push, or
    /// [`Error::NonFastForward`] if the branch moved.
    pub fn push(
        &self,
        workspace: &StagingWorkspace<'_>,
        actor: &User,
        commit: Oid,
        branch: &str,
        expected: Option<Oid>,
    ) -> Result<()> {
        self.check_push(branch, actor)?;
        Ok(workspace.push(&actor.email, commit, branch, expected)?)
    }
}

/// `/srv/widgets.git` -> `widgets`, `/src/widgets/.git` -> `widgets`.
fn infer_name(git_dir: &Path) -> String {
    let dir = if git_dir.file_name().is_some_and(|n| n == ".git") {
        git_dir.parent().unwrap_or(git_dir)
    } else {
        git_dir
    };
    dir.file_name()
        .map(|n| n.to_string_lossy().trim_end_matches(".git").to_string())
        .unwrap_or_default()
}
