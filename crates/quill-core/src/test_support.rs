//! Repository fixtures shared by the unit tests.

#![allow(clippy::unwrap_used)]

use std::path::Path;

use git2::{Oid, Signature, Time};
use tempfile::TempDir;

use crate::config::RepoSettings;
use crate::repository::Repository;

/// A bare repository on disk with a `main` branch.
pub struct Fixture {
    temp: TempDir,
    /// Tip of `main` after seeding.
    pub tip: Oid,
}

impl Fixture {
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Open with default settings.
    pub fn open(&self) -> Repository {
        self.open_with(RepoSettings::default())
    }

    pub fn open_with(&self, settings: RepoSettings) -> Repository {
        Repository::with_settings(quill_git::Repository::open(self.path()).unwrap(), settings)
    }

    fn raw(&self) -> git2::Repository {
        git2::Repository::open_bare(self.path()).unwrap()
    }

    pub fn branch_tip(&self, branch: &str) -> Option<Oid> {
        self.raw()
            .refname_to_id(&format!("refs/heads/{branch}"))
            .ok()
    }

    /// Content of `path` on `branch`, if present.
    pub fn read(&self, branch: &str, path: &str) -> Option<String> {
        let raw = self.raw();
        let tip = raw.refname_to_id(&format!("refs/heads/{branch}")).ok()?;
        let tree = raw.find_commit(tip).unwrap().tree().unwrap();
        let entry = tree.get_path(Path::new(path)).ok()?;
        let blob = raw.find_blob(entry.id()).unwrap();
        Some(String::from_utf8_lossy(blob.content()).into_owned())
    }

    /// Blob hash of `content`.
    pub fn blob_id(content: &str) -> Oid {
        Oid::hash_object(git2::ObjectType::Blob, content.as_bytes()).unwrap()
    }

    /// Commit `path` = `content` on top of `branch` and move the branch, as
    /// another writer would.
    pub fn advance(&self, branch: &str, path: &str, content: &str) -> Oid {
        let raw = self.raw();
        let refname = format!("refs/heads/{branch}");
        let parent = raw.find_commit(raw.refname_to_id(&refname).unwrap()).unwrap();

        let mut index = git2::Index::new().unwrap();
        index.read_tree(&parent.tree().unwrap()).unwrap();
        add(&raw, &mut index, path, content);
        let tree = raw.find_tree(index.write_tree_to(&raw).unwrap()).unwrap();

        let sig = signature();
        raw.commit(Some(&refname), &sig, &sig, "external change", &tree, &[&parent])
            .unwrap()
    }

    /// Create `branch` at `at`.
    pub fn branch(&self, branch: &str, at: Oid) {
        self.raw()
            .reference(&format!("refs/heads/{branch}"), at, false, "fixture")
            .unwrap();
    }
}

fn signature() -> Signature<'static> {
    Signature::new("Seed", "seed@example.com", &Time::new(1_700_000_000, 0)).unwrap()
}

fn add(raw: &git2::Repository, index: &mut git2::Index, path: &str, content: &str) {
    let id = raw.blob(content.as_bytes()).unwrap();
    index
        .add(&quill_git::blob_entry(path, id, content.len()))
        .unwrap();
}

/// Create a bare repository whose `main` branch holds one commit with `files`.
pub fn seeded_repo(files: &[(&str, &str)]) -> Fixture {
    let temp = TempDir::new().unwrap();
    let raw = git2::Repository::init_bare(temp.path()).unwrap();

    let mut index = git2::Index::new().unwrap();
    for (path, content) in files {
        add(&raw, &mut index, path, content);
    }
    let tree = raw.find_tree(index.write_tree_to(&raw).unwrap()).unwrap();
    let sig = signature();
    let tip = raw
        .commit(Some("refs/heads/main"), &sig, &sig, "seed", &tree, &[])
        .unwrap();
    raw.set_head("refs/heads/main").unwrap();

    Fixture { temp, tip }
}
