//! Repository fixtures shared by the unit tests.

#![allow(clippy::unwrap_used)]

use git2::{Oid, Signature, Time};
use tempfile::TempDir;

use crate::repository::Repository;
use crate::workspace::blob_entry;

fn fixed_signature() -> Signature<'static> {
    Signature::new("Seed", "seed@example.com", &Time::new(1_700_000_000, 0)).unwrap()
}

/// Create a bare repository whose `main` branch holds one commit with `files`.
pub fn seeded_repo(files: &[(&str, &str)]) -> (TempDir, Repository, Oid) {
    let temp = TempDir::new().unwrap();
    let raw = git2::Repository::init_bare(temp.path()).unwrap();

    let mut index = git2::Index::new().unwrap();
    for (path, content) in files {
        let blob = raw.blob(content.as_bytes()).unwrap();
        index.add(&blob_entry(path, blob, content.len())).unwrap();
    }
    let tree_id = index.write_tree_to(&raw).unwrap();
    let tip = {
        let tree = raw.find_tree(tree_id).unwrap();
        let sig = fixed_signature();
        raw.commit(Some("refs/heads/main"), &sig, &sig, "seed", &tree, &[])
            .unwrap()
    };
    raw.set_head("refs/heads/main").unwrap();
    drop(raw);

    let repo = Repository::open(temp.path()).unwrap();
    (temp, repo, tip)
}

/// Create (without moving any ref) a child of `parent` that also contains `path`.
pub fn commit_on(repo: &Repository, parent: Oid, path: &str, content: &str) -> Oid {
    let raw = repo.inner();
    let parent = raw.find_commit(parent).unwrap();

    let mut index = git2::Index::new().unwrap();
    index.read_tree(&parent.tree().unwrap()).unwrap();
    let blob = raw.blob(content.as_bytes()).unwrap();
    index.add(&blob_entry(path, blob, content.len())).unwrap();
    let tree = raw.find_tree(index.write_tree_to(raw).unwrap()).unwrap();

    let sig = fixed_signature();
    raw.commit(None, &sig, &sig, &format!("add {path}"), &tree, &[&parent])
        .unwrap()
}
