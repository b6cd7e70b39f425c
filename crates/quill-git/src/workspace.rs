//! Disposable staging workspaces.
//!
//! A [`StagingWorkspace`] is a bare scratch repository living in a temporary
//! directory. Its object database borrows the live repository's objects
//! through `objects/info/alternates` (the equivalent of `git clone --shared`),
//! so cloning is cheap and nothing written during staging is visible in the
//! live repository until [`StagingWorkspace::push`] imports it.
//!
//! The temporary directory is owned by the workspace and removed when it is
//! dropped, on success and failure alike.

use std::fs;
use std::io;
use std::path::Path;

use git2::{IndexEntry, IndexTime, Oid, Signature};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{Error, Result};
use crate::repository::{Repository, TreeEntryInfo, entry_at};

const REGULAR_FILE_MODE: u32 = 0o100_644;

/// Build an index entry for a regular file blob.
#[must_use]
pub fn blob_entry(path: &str, id: Oid, size: usize) -> IndexEntry {
    IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: REGULAR_FILE_MODE,
        uid: 0,
        gid: 0,
        file_size: u32::try_from(size).unwrap_or(u32::MAX),
        id,
        flags: 0,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    }
}

/// An isolated sandbox for building one commit against a live repository.
///
/// Steps run in order: [`open`](Self::open), [`clone_branch`](Self::clone_branch),
/// [`load_index`](Self::load_index), index edits, [`write_tree`](Self::write_tree),
/// [`commit_tree`](Self::commit_tree), [`push`](Self::push). Calling a step
/// before its prerequisites yields [`Error::WorkspaceState`].
pub struct StagingWorkspace<'r> {
    source: &'r Repository,
    repo: git2::Repository,
    branch: Option<String>,
    tip: Option<Oid>,
    index: Option<git2::Index>,
    // Declared last so the directory outlives the handles into it.
    dir: TempDir,
}

impl<'r> StagingWorkspace<'r> {
    /// Allocate a scratch repository linked to `source`'s object database.
    ///
    /// The workspace is created under `temp_root`, or the system temp
    /// directory when `None`.
    ///
    /// # Errors
    /// Returns [`Error::WorkspaceAllocation`] if the directory or the scratch
    /// repository cannot be created.
    pub fn open(source: &'r Repository, temp_root: Option<&Path>) -> Result<Self> {
        let root = temp_root.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let allocation = |source: io::Error| Error::WorkspaceAllocation {
            root: root.clone(),
            source,
        };

        fs::create_dir_all(&root).map_err(allocation)?;
        let dir = tempfile::Builder::new()
            .prefix("quill-ws-")
            .tempdir_in(&root)
            .map_err(allocation)?;
        let repo = init_shared(dir.path(), &source.objects_dir()).map_err(allocation)?;

        debug!(path = %dir.path().display(), "staging workspace allocated");
        Ok(Self {
            source,
            repo,
            branch: None,
            tip: None,
            index: None,
            dir,
        })
    }

    /// Path of the scratch repository.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Point the workspace at `branch`'s current tip in the live repository.
    ///
    /// # Errors
    /// Returns [`Error::BranchNotFound`] if the branch does not exist.
    pub fn clone_branch(&mut self, branch: &str) -> Result<()> {
        let tip = self.source.branch_commit(branch)?;
        let local = format!("refs/heads/{branch}");

        self.repo.reference(
            &format!("refs/remotes/origin/{branch}"),
            tip,
            true,
            "clone: from live repository",
        )?;
        self.repo
            .reference(&local, tip, true, "clone: checkout branch")?;
        self.repo.set_head(&local)?;

        debug!(%branch, %tip, "workspace cloned");
        self.branch = Some(branch.to_string());
        self.tip = Some(tip);
        Ok(())
    }

    /// Branch the workspace was cloned from.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Reset the index to the cloned tip's tree.
    ///
    /// # Errors
    /// Returns error if the workspace has not been cloned or the tree cannot be read.
    pub fn load_index(&mut self) -> Result<()> {
        let tree = self.repo.find_commit(self.last_commit()?)?.tree()?;
        let mut index = git2::Index::new()?;
        index.read_tree(&tree)?;
        debug!(entries = index.len(), "index loaded");
        self.index = Some(index);
        Ok(())
    }

    /// Tip commit of the cloned branch.
    ///
    /// # Errors
    /// Returns [`Error::WorkspaceState`] before [`clone_branch`](Self::clone_branch).
    pub fn last_commit(&self) -> Result<Oid> {
        self.tip
            .ok_or(Error::WorkspaceState("clone_branch must run first"))
    }

    fn index(&self) -> Result<&git2::Index> {
        self.index
            .as_ref()
            .ok_or(Error::WorkspaceState("load_index must run first"))
    }

    fn index_mut(&mut self) -> Result<&mut git2::Index> {
        self.index
            .as_mut()
            .ok_or(Error::WorkspaceState("load_index must run first"))
    }

    /// Indexed paths equal to `prefix` or below it as a directory.
    ///
    /// An empty prefix lists everything. The iterator is lazy; call again to
    /// restart from the beginning.
    ///
    /// # Errors
    /// Returns error if the index has not been loaded.
    pub fn indexed_paths(&self, prefix: &str) -> Result<impl Iterator<Item = String> + '_> {
        let prefix = prefix.trim_end_matches('/').to_string();
        let index = self.index()?;

        Ok(index.iter().filter_map(move |entry| {
            let path = String::from_utf8_lossy(&entry.path).into_owned();
            let under = prefix.is_empty()
                || path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
            under.then_some(path)
        }))
    }

    /// Whether `path` is a file in the index.
    ///
    /// # Errors
    /// Returns error if the index has not been loaded.
    pub fn is_tracked(&self, path: &str) -> Result<bool> {
        Ok(self.index()?.get_path(Path::new(path), 0).is_some())
    }

    /// Stage the removal of `path`.
    ///
    /// # Errors
    /// Returns [`Error::PathNotTracked`] if the path is not in the index.
    pub fn remove_path(&mut self, path: &str) -> Result<()> {
        let index = self.index_mut()?;
        if index.get_path(Path::new(path), 0).is_none() {
            return Err(Error::PathNotTracked(path.to_string()));
        }
        index.remove(Path::new(path), 0)?;
        debug!(%path, "staged removal");
        Ok(())
    }

    /// Store `content` as a blob and stage it at `path`, returning the blob hash.
    ///
    /// # Errors
    /// Returns error if the index has not been loaded or the blob cannot be written.
    pub fn write_path(&mut self, path: &str, content: &[u8]) -> Result<Oid> {
        self.index()?;
        let blob = self.repo.blob(content)?;
        self.index_mut()?
            .add(&blob_entry(path, blob, content.len()))?;
        debug!(%path, %blob, "staged write");
        Ok(blob)
    }

    /// Look up `path` in the cloned tip's tree.
    ///
    /// # Errors
    /// Returns error if the workspace has not been cloned.
    pub fn tip_entry(&self, path: &str) -> Result<Option<TreeEntryInfo>> {
        let tree = self.repo.find_commit(self.last_commit()?)?.tree()?;
        entry_at(&tree, path)
    }

    /// Write the index out as a tree object.
    ///
    /// # Errors
    /// Returns error if the index has not been loaded or the write fails.
    pub fn write_tree(&mut self) -> Result<Oid> {
        let index = self
            .index
            .as_mut()
            .ok_or(Error::WorkspaceState("load_index must run first"))?;
        let tree = index.write_tree_to(&self.repo)?;
        debug!(%tree, "tree written");
        Ok(tree)
    }

    /// Create a commit of `tree` on top of the cloned tip. No ref is moved.
    ///
    /// # Errors
    /// Returns error if the workspace has not been cloned or the write fails.
    pub fn commit_tree(
        &self,
        author: &Signature<'_>,
        committer: &Signature<'_>,
        tree: Oid,
        message: &str,
    ) -> Result<Oid> {
        let parent = self.repo.find_commit(self.last_commit()?)?;
        let tree = self.repo.find_tree(tree)?;
        let commit = self
            .repo
            .commit(None, author, committer, message, &tree, &[&parent])?;
        debug!(%commit, "commit created");
        Ok(commit)
    }

    /// Land `commit` on `target_branch` in the live repository.
    ///
    /// Missing objects are imported first, then the branch ref is moved with
    /// compare-and-swap from `expected` (or created when `expected` is `None`).
    ///
    /// # Errors
    /// Returns [`Error::NonFastForward`] if the commit does not descend from
    /// `expected` or the branch moved since the workspace was cloned.
    pub fn push(
        &self,
        pusher: &str,
        commit: Oid,
        target_branch: &str,
        expected: Option<Oid>,
    ) -> Result<()> {
        if let Some(old) = expected {
            if commit != old && !self.repo.graph_descendant_of(commit, old)? {
                return Err(Error::NonFastForward {
                    branch: target_branch.to_string(),
                    expected: old.to_string(),
                    actual: commit.to_string(),
                });
            }
        }

        let imported = self.source.import_objects(&self.repo, commit)?;
        debug!(imported, %commit, "objects imported into live repository");

        self.source.update_branch(
            target_branch,
            commit,
            expected,
            &format!("quill: push by {pusher}"),
        )
    }
}

impl Drop for StagingWorkspace<'_> {
    fn drop(&mut self) {
        debug!(path = %self.dir.path().display(), "releasing staging workspace");
    }
}

impl std::fmt::Debug for StagingWorkspace<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingWorkspace")
            .field("path", &self.dir.path())
            .field("branch", &self.branch)
            .field("tip", &self.tip)
            .finish_non_exhaustive()
    }
}

/// Create a bare repository at `path` that reads `objects` as an alternate.
fn init_shared(path: &Path, objects: &Path) -> io::Result<git2::Repository> {
    git2::Repository::init_bare(path).map_err(io::Error::other)?;

    let info = path.join("objects").join("info");
    fs::create_dir_all(&info)?;
    let objects = fs::canonicalize(objects)?;
    fs::write(info.join("alternates"), format!("{}\n", objects.display()))?;

    // Reopen so the object database picks up the alternate.
    git2::Repository::open_bare(path).map_err(io::Error::other)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{commit_on, seeded_repo};
    use git2::Time;

    fn sig() -> Signature<'static> {
        Signature::new("Ada", "ada@example.com", &Time::new(1_700_000_100, 0)).unwrap()
    }

    fn staged<'r>(repo: &'r Repository, branch: &str) -> StagingWorkspace<'r> {
        let mut ws = StagingWorkspace::open(repo, None).unwrap();
        ws.clone_branch(branch).unwrap();
        ws.load_index().unwrap();
        ws
    }

    #[test]
    fn test_workspace_directory_removed_on_drop() {
        let (_temp, repo, _) = seeded_repo(&[("a.txt", "a")]);
        let ws = StagingWorkspace::open(&repo, None).unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.exists());

        drop(ws);
        assert!(!path.exists());
    }

    #[test]
    fn test_open_under_custom_root() {
        let (_temp, repo, _) = seeded_repo(&[("a.txt", "a")]);
        let root = tempfile::TempDir::new().unwrap();
        let nested = root.path().join("scratch");

        let ws = StagingWorkspace::open(&repo, Some(&nested)).unwrap();
        assert!(ws.path().starts_with(&nested));
    }

    #[test]
    fn test_open_fails_when_root_is_a_file() {
        let (_temp, repo, _) = seeded_repo(&[("a.txt", "a")]);
        let root = tempfile::TempDir::new().unwrap();
        let file = root.path().join("occupied");
        fs::write(&file, "not a directory").unwrap();

        let err = StagingWorkspace::open(&repo, Some(&file)).unwrap_err();
        assert!(matches!(err, Error::WorkspaceAllocation { .. }));
    }

    #[test]
    fn test_clone_missing_branch() {
        let (_temp, repo, _) = seeded_repo(&[("a.txt", "a")]);
        let mut ws = StagingWorkspace::open(&repo, None).unwrap();
        let err = ws.clone_branch("nope").unwrap_err();
        assert!(matches!(err, Error::BranchNotFound(_)));
    }

    #[test]
    fn test_steps_out_of_order() {
        let (_temp, repo, _) = seeded_repo(&[("a.txt", "a")]);
        let mut ws = StagingWorkspace::open(&repo, None).unwrap();

        assert!(matches!(ws.last_commit(), Err(Error::WorkspaceState(_))));
        assert!(matches!(ws.write_tree(), Err(Error::WorkspaceState(_))));

        ws.clone_branch("main").unwrap();
        assert!(matches!(
            ws.remove_path("a.txt"),
            Err(Error::WorkspaceState(_))
        ));
    }

    #[test]
    fn test_clone_tracks_tip_and_lists_paths() {
        let (_temp, repo, tip) = seeded_repo(&[
            ("docs/readme.md", "read me"),
            ("docs/guide/intro.md", "intro"),
            ("docs-old.md", "old"),
            ("src/lib.rs", "//"),
        ]);
        let ws = staged(&repo, "main");

        assert_eq!(ws.last_commit().unwrap(), tip);
        assert_eq!(ws.branch(), Some("main"));

        let docs: Vec<String> = ws.indexed_paths("docs").unwrap().collect();
        assert_eq!(docs, vec!["docs/guide/intro.md", "docs/readme.md"]);

        let exact: Vec<String> = ws.indexed_paths("docs/readme.md").unwrap().collect();
        assert_eq!(exact, vec!["docs/readme.md"]);

        // Restartable: a fresh call sees everything again.
        assert_eq!(ws.indexed_paths("").unwrap().count(), 4);
        assert_eq!(ws.indexed_paths("").unwrap().count(), 4);
    }

    #[test]
    fn test_remove_untracked_path() {
        let (_temp, repo, _) = seeded_repo(&[("a.txt", "a")]);
        let mut ws = staged(&repo, "main");

        let err = ws.remove_path("x").unwrap_err();
        assert!(matches!(err, Error::PathNotTracked(p) if p == "x"));
    }

    #[test]
    fn test_delete_commit_and_push() {
        let (_temp, repo, tip) = seeded_repo(&[("docs/readme.md", "hi"), ("a.txt", "a")]);
        let mut ws = staged(&repo, "main");

        ws.remove_path("docs/readme.md").unwrap();
        assert!(!ws.is_tracked("docs/readme.md").unwrap());
        let tree = ws.write_tree().unwrap();
        let commit = ws.commit_tree(&sig(), &sig(), tree, "Delete readme").unwrap();

        // Nothing visible until the push.
        assert_eq!(repo.branch_commit("main").unwrap(), tip);
        assert!(repo.find_commit(commit).is_err());

        ws.push("ada", commit, "main", Some(tip)).unwrap();
        assert_eq!(repo.branch_commit("main").unwrap(), commit);
        assert!(repo.tree_entry(commit, "docs/readme.md").unwrap().is_none());
        assert!(repo.tree_entry(commit, "a.txt").unwrap().is_some());

        let landed = repo.find_commit(commit).unwrap();
        assert_eq!(landed.parent_id(0).unwrap(), tip);
        assert_eq!(landed.message(), Some("Delete readme"));
    }

    #[test]
    fn test_write_path_and_push_to_new_branch() {
        let (_temp, repo, tip) = seeded_repo(&[("a.txt", "a")]);
        let mut ws = staged(&repo, "main");

        let blob = ws.write_path("notes/todo.md", b"- ship it\n").unwrap();
        let tree = ws.write_tree().unwrap();
        let commit = ws.commit_tree(&sig(), &sig(), tree, "Add todo").unwrap();
        ws.push("ada", commit, "feature/todo", None).unwrap();

        assert_eq!(repo.branch_commit("main").unwrap(), tip);
        assert_eq!(repo.branch_commit("feature/todo").unwrap(), commit);
        let entry = repo.tree_entry(commit, "notes/todo.md").unwrap().unwrap();
        assert_eq!(entry.id, blob);
    }

    /// Copy a single workspace object into the live repository, as an
    /// interrupted earlier import would have left it.
    fn leave_behind(ws: &StagingWorkspace<'_>, repo: &Repository, oid: Oid) {
        let odb = ws.repo.odb().unwrap();
        let object = odb.read(oid).unwrap();
        repo.inner()
            .odb()
            .unwrap()
            .write(object.kind(), object.data())
            .unwrap();
    }

    #[test]
    fn test_push_completes_commit_left_without_its_tree() {
        let (_temp, repo, tip) = seeded_repo(&[("a.txt", "a")]);
        let mut ws = staged(&repo, "main");

        let blob = ws.write_path("new.txt", b"new\n").unwrap();
        let tree = ws.write_tree().unwrap();
        let commit = ws.commit_tree(&sig(), &sig(), tree, "Add new").unwrap();
        leave_behind(&ws, &repo, commit);
        assert!(repo.inner().find_tree(tree).is_err());

        ws.push("ada", commit, "main", Some(tip)).unwrap();
        assert_eq!(repo.branch_commit("main").unwrap(), commit);
        assert!(repo.inner().find_tree(tree).is_ok());
        assert!(repo.inner().find_blob(blob).is_ok());
    }

    #[test]
    fn test_push_completes_tree_left_without_its_blobs() {
        let (_temp, repo, tip) = seeded_repo(&[("a.txt", "a")]);
        let mut ws = staged(&repo, "main");

        let blob = ws.write_path("docs/new.txt", b"new\n").unwrap();
        let tree = ws.write_tree().unwrap();
        let commit = ws.commit_tree(&sig(), &sig(), tree, "Add new").unwrap();
        leave_behind(&ws, &repo, tree);

        ws.push("ada", commit, "main", Some(tip)).unwrap();
        let entry = repo.tree_entry(commit, "docs/new.txt").unwrap().unwrap();
        assert_eq!(entry.id, blob);
        assert!(repo.inner().find_blob(blob).is_ok());
    }

    #[test]
    fn test_identical_content_yields_identical_tree() {
        let (_temp, repo, _) = seeded_repo(&[("a.txt", "a"), ("b.txt", "b")]);

        let mut first = staged(&repo, "main");
        first.remove_path("b.txt").unwrap();
        let first_tree = first.write_tree().unwrap();
        drop(first);

        let mut second = staged(&repo, "main");
        second.remove_path("b.txt").unwrap();
        assert_eq!(second.write_tree().unwrap(), first_tree);
    }

    #[test]
    fn test_racing_pushes_from_same_tip() {
        let (_temp, repo, tip) = seeded_repo(&[("a.txt", "a"), ("b.txt", "b")]);

        let mut left = staged(&repo, "main");
        let mut right = staged(&repo, "main");

        left.remove_path("a.txt").unwrap();
        let left_tree = left.write_tree().unwrap();
        let left_commit = left.commit_tree(&sig(), &sig(), left_tree, "left").unwrap();

        right.remove_path("b.txt").unwrap();
        let right_tree = right.write_tree().unwrap();
        let right_commit = right
            .commit_tree(&sig(), &sig(), right_tree, "right")
            .unwrap();

        left.push("left", left_commit, "main", Some(tip)).unwrap();
        let err = right
            .push("right", right_commit, "main", Some(tip))
            .unwrap_err();

        assert!(matches!(err, Error::NonFastForward { .. }));
        assert_eq!(repo.branch_commit("main").unwrap(), left_commit);
    }

    #[test]
    fn test_push_rejects_commit_not_descending_from_expected() {
        let (_temp, repo, tip) = seeded_repo(&[("a.txt", "a")]);
        let mut ws = staged(&repo, "main");

        let moved = commit_on(&repo, tip, "b.txt", "b");
        repo.update_branch("main", moved, Some(tip), "external")
            .unwrap();

        ws.remove_path("a.txt").unwrap();
        let tree = ws.write_tree().unwrap();
        let commit = ws.commit_tree(&sig(), &sig(), tree, "drop a").unwrap();

        // Rejected before any object reaches the live repository.
        let err = ws.push("ada", commit, "main", Some(moved)).unwrap_err();
        assert!(matches!(err, Error::NonFastForward { .. }));
        assert!(repo.find_commit(commit).is_err());
        assert_eq!(repo.branch_commit("main").unwrap(), moved);
    }
}
