//! Live repository wrapper: branch lookup, object import and atomic ref updates.

use std::path::{Path, PathBuf};

use git2::{BranchType, ErrorCode, ObjectType, Oid, Signature};
use tracing::debug;

use crate::error::{Error, Result};

/// A single entry read from a commit's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntryInfo {
    /// Path of the entry relative to the tree root.
    pub path: String,
    /// Content hash of the blob (or subtree).
    pub id: Oid,
    /// Git file mode, e.g. `0o100644`.
    pub mode: i32,
    /// Whether the entry is a subtree rather than a file.
    pub is_tree: bool,
}

/// Look up `path` inside `tree`, returning `None` when nothing is there.
pub(crate) fn entry_at(tree: &git2::Tree<'_>, path: &str) -> Result<Option<TreeEntryInfo>> {
    match tree.get_path(Path::new(path)) {
        Ok(entry) => Ok(Some(TreeEntryInfo {
            path: path.to_string(),
            id: entry.id(),
            mode: entry.filemode(),
            is_tree: entry.kind() == Some(ObjectType::Tree),
        })),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn branch_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

fn describe(oid: Option<Oid>) -> String {
    oid.map_or_else(|| "<none>".to_string(), |oid| oid.to_string())
}

fn copy_object(
    src: &git2::Odb<'_>,
    dst: &git2::Odb<'_>,
    oid: Oid,
    written: &mut usize,
) -> Result<()> {
    if dst.exists(oid) {
        return Ok(());
    }
    let object = src.read(oid)?;
    dst.write(object.kind(), object.data())?;
    *written += 1;
    Ok(())
}

/// High-level wrapper around the live (shared) repository.
///
/// Every mutation workflow opens its own handle; the only state shared between
/// handles is the on-disk ref store, which is updated with compare-and-swap.
pub struct Repository {
    inner: git2::Repository,
}

impl Repository {
    /// Open a repository at the given path.
    ///
    /// # Errors
    /// Returns error if no repository found at path or any parent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = git2::Repository::discover(path).map_err(|e| {
            if e.code() == ErrorCode::NotFound {
                Error::NotARepository(path.to_path_buf())
            } else {
                Error::Git2(e)
            }
        })?;
        Ok(Self { inner })
    }

    /// Get the path to the git directory (the repository itself when bare).
    #[must_use]
    pub fn git_dir(&self) -> &Path {
        self.inner.path()
    }

    /// Get the path to the object database.
    #[must_use]
    pub fn objects_dir(&self) -> PathBuf {
        self.inner.path().join("objects")
    }

    // === Branch operations ===

    /// Get the commit SHA for a branch.
    ///
    /// # Errors
    /// Returns error if branch doesn't exist.
    pub fn branch_commit(&self, branch_name: &str) -> Result<Oid> {
        let branch = self
            .inner
            .find_branch(branch_name, BranchType::Local)
            .map_err(|_| Error::BranchNotFound(branch_name.into()))?;

        branch
            .get()
            .target()
            .ok_or_else(|| Error::BranchNotFound(branch_name.into()))
    }

    /// Check if a branch exists.
    #[must_use]
    pub fn branch_exists(&self, name: &str) -> bool {
        self.inner.find_branch(name, BranchType::Local).is_ok()
    }

    /// Look up a path in the tree of the given commit.
    ///
    /// # Errors
    /// Returns error if the commit or its tree cannot be read.
    pub fn tree_entry(&self, commit: Oid, path: &str) -> Result<Option<TreeEntryInfo>> {
        let tree = self.inner.find_commit(commit)?.tree()?;
        entry_at(&tree, path)
    }

    /// Get a commit by its SHA.
    ///
    /// # Errors
    /// Returns error if commit not found.
    pub fn find_commit(&self, oid: Oid) -> Result<git2::Commit<'_>> {
        Ok(self.inner.find_commit(oid)?)
    }

    // === Landing ===

    /// Copy the objects `tip` needs out of `from`'s object database.
    ///
    /// Objects are written children first: blobs, then the trees holding
    /// them, then the commit. A commit or tree found here is therefore only
    /// trusted when it is the same tree the first parent already carries at
    /// that position; anything else is walked again so a half-finished earlier
    /// import gets completed. Parent commits already present are reachable
    /// from live refs and are not walked. Returns the number of objects
    /// written.
    ///
    /// # Errors
    /// Returns error if an object cannot be read or written.
    pub fn import_objects(&self, from: &git2::Repository, tip: Oid) -> Result<usize> {
        let src = from.odb()?;
        let dst = self.inner.odb()?;
        let mut written = 0;
        self.import_commit(from, &src, &dst, tip, &mut written)?;
        Ok(written)
    }

    fn import_commit(
        &self,
        from: &git2::Repository,
        src: &git2::Odb<'_>,
        dst: &git2::Odb<'_>,
        oid: Oid,
        written: &mut usize,
    ) -> Result<()> {
        let commit = from.find_commit(oid)?;
        for parent in commit.parent_ids() {
            if !dst.exists(parent) {
                self.import_commit(from, src, dst, parent, written)?;
            }
        }

        let base = match commit.parent_ids().next() {
            Some(parent) => Some(self.inner.find_commit(parent)?.tree_id()),
            None => None,
        };
        self.import_tree(from, src, dst, commit.tree_id(), base, written)?;
        copy_object(src, dst, oid, written)
    }

    fn import_tree(
        &self,
        from: &git2::Repository,
        src: &git2::Odb<'_>,
        dst: &git2::Odb<'_>,
        oid: Oid,
        base: Option<Oid>,
        written: &mut usize,
    ) -> Result<()> {
        if base == Some(oid) {
            return Ok(());
        }

        let tree = from.find_tree(oid)?;
        let base_tree = match base {
            Some(id) => Some(self.inner.find_tree(id)?),
            None => None,
        };
        for entry in tree.iter() {
            match entry.kind() {
                Some(ObjectType::Tree) => {
                    let base_child = base_tree
                        .as_ref()
                        .zip(entry.name())
                        .and_then(|(base_tree, name)| base_tree.get_name(name))
                        .filter(|child| child.kind() == Some(ObjectType::Tree))
                        .map(|child| child.id());
                    self.import_tree(from, src, dst, entry.id(), base_child, written)?;
                }
                Some(ObjectType::Blob) => copy_object(src, dst, entry.id(), written)?,
                // Gitlinks point into other repositories.
                _ => {}
            }
        }
        copy_object(src, dst, oid, written)
    }

    /// Move `branch` to `new_tip` iff it still points at `expected`.
    ///
    /// `expected == None` means the branch must not exist yet. The check and
    /// the write happen under the ref lock, so of two racing updaters from the
    /// same base exactly one wins.
    ///
    /// # Errors
    /// Returns [`Error::NonFastForward`] if the precondition does not hold.
    pub fn update_branch(
        &self,
        branch: &str,
        new_tip: Oid,
        expected: Option<Oid>,
        log_message: &str,
    ) -> Result<()> {
        let refname = branch_ref(branch);

        let outcome = match expected {
            Some(old) => self
                .inner
                .reference_matching(&refname, new_tip, true, old, log_message),
            None => self.inner.reference(&refname, new_tip, false, log_message),
        };

        match outcome {
            Ok(_) => {
                debug!(%refname, old = %describe(expected), new = %new_tip, "ref updated");
                Ok(())
            }
            // A held ref lock means another writer is landing on the same branch.
            Err(e)
                if matches!(
                    e.code(),
                    ErrorCode::Modified
                        | ErrorCode::Exists
                        | ErrorCode::NotFound
                        | ErrorCode::Locked
                ) =>
            {
                Err(Error::NonFastForward {
                    branch: branch.to_string(),
                    expected: describe(expected),
                    actual: describe(self.inner.refname_to_id(&refname).ok()),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    // === Signature ===

    /// Get the default signature for commits.
    ///
    /// # Errors
    /// Returns error if git config doesn't have user.name/email.
    pub fn signature(&self) -> Result<Signature<'_>> {
        Ok(self.inner.signature()?)
    }

    // === Low-level access ===

    /// Get a reference to the underlying git2 repository.
    ///
    /// Use sparingly - prefer high-level methods.
    #[must_use]
    pub const fn inner(&self) -> &git2::Repository {
        &self.inner
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.git_dir())
            .finish()
    }
}
