use std::path::Path;

use anyhow::{Context, Result};
use quill_core::{
    EventSink, FileMutator, JsonLinesSink, Landed, NullSink, Repository, StaticDirectory, User,
    UserDirectory,
};

use super::{Global, MutationArgs};
use crate::output;

/// Open the repository named by `--repo`, or the one containing the current
/// directory.
pub fn open_repo(global: &Global) -> Result<Repository> {
    let path = global.repo.as_deref().unwrap_or_else(|| Path::new("."));
    Repository::open(path).context("Not inside a git repository")
}

/// Users configured in the repository's settings.
pub fn directory(repo: &Repository) -> StaticDirectory {
    StaticDirectory::new(repo.settings().users.clone())
}

/// The user the command acts as: the configured user matching `--as`, else
/// the repository's git identity.
pub fn acting_user(
    repo: &Repository,
    directory: &StaticDirectory,
    as_user: Option<&str>,
) -> Result<User> {
    if let Some(email) = as_user {
        return directory
            .find_by_email(email)
            .with_context(|| format!("No configured user with email '{email}'"));
    }

    let signature = repo
        .git()
        .signature()
        .context("No identity: pass --as or set user.name and user.email")?;
    let name = signature.name().unwrap_or_default().to_string();
    let email = signature.email().unwrap_or_default().to_string();

    Ok(directory
        .find_by_email(&email)
        .unwrap_or_else(|| User::new(0, name, email)))
}

/// Where push events go: the configured JSON lines log, or nowhere.
pub fn event_sink(repo: &Repository) -> Box<dyn EventSink> {
    match &repo.settings().events.log_path {
        Some(path) => Box::new(JsonLinesSink::new(path)),
        None => Box::new(NullSink),
    }
}

/// Run `apply` with a mutator wired to the repository's settings, then
/// report the outcome.
pub fn mutate<F>(global: &Global, args: &MutationArgs, apply: F) -> Result<()>
where
    F: FnOnce(
        &FileMutator<'_, StaticDirectory, dyn EventSink>,
        &User,
    ) -> quill_core::Result<Landed>,
{
    let repo = open_repo(global)?;
    let directory = directory(&repo);
    let doer = acting_user(&repo, &directory, args.as_user.as_deref())?;
    let sink = event_sink(&repo);

    let mutator = FileMutator::new(&repo, &directory, sink.as_ref());
    let landed = apply(&mutator, &doer)?;
    report(global, &landed)
}

fn report(global: &Global, landed: &Landed) -> Result<()> {
    if let Err(e) = &landed.delivery {
        output::warn(&format!("Commit landed but the push event was not delivered: {e}"));
    }

    if global.json {
        output::essential(&serde_json::to_string_pretty(&landed.file)?);
        return Ok(());
    }

    let commit = &landed.file.commit;
    output::success(&format!(
        "{} on {}",
        commit.message.lines().next().unwrap_or_default(),
        output::branch(landed.event.branch())
    ));
    output::field("parent", &output::short_hash(&landed.event.old_commit_id));
    if let Some(sha) = &landed.file.content_sha {
        output::field("blob", &output::short_hash(sha));
    }
    if landed.event.is_creation() {
        output::info(&format!("Created branch '{}'", landed.event.branch()));
    }
    output::essential(&commit.sha);
    Ok(())
}
