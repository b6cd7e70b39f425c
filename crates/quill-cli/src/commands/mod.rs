//! Command definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use quill_core::{IdentityOptions, MutationRequest};

pub mod completions;
pub mod delete;
pub mod utils;
pub mod write;

/// Quill - commit a single-file change to a git branch without a checkout.
#[derive(Debug, Parser)]
#[command(name = "quill", version, about)]
pub struct Cli {
    /// Repository to operate on (defaults to the current directory).
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,

    /// Print the result as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Only print errors and essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Options shared by every mutating command.
    #[must_use]
    pub fn global(&self) -> Global {
        Global {
            repo: self.repo.clone(),
            json: self.json,
        }
    }
}

/// Global options passed down to commands.
#[derive(Debug, Clone)]
pub struct Global {
    pub repo: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Delete a file from a branch.
    Delete {
        /// Path of the file inside the repository.
        path: String,

        #[command(flatten)]
        args: MutationArgs,
    },

    /// Create or replace a file on a branch.
    Write {
        /// Path of the file inside the repository.
        path: String,

        /// Read new content from this file ("-" for stdin).
        #[arg(long, value_name = "FILE")]
        from: PathBuf,

        /// Fail if the file already exists instead of requiring it to.
        #[arg(long)]
        create: bool,

        #[command(flatten)]
        args: MutationArgs,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Options shared by `delete` and `write`.
#[derive(Debug, Clone, Default, Args)]
pub struct MutationArgs {
    /// Branch to read from (defaults to the repository's default branch).
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Commit onto a new branch with this name instead.
    #[arg(long, value_name = "NAME")]
    pub new_branch: Option<String>,

    /// Expected blob hash of the current file.
    #[arg(long)]
    pub sha: Option<String>,

    /// Commit the change was based on.
    #[arg(long, value_name = "COMMIT")]
    pub last_commit: Option<String>,

    /// Commit message.
    #[arg(short, long)]
    pub message: Option<String>,

    /// Attribute authorship to the user with this email.
    #[arg(long, value_name = "EMAIL")]
    pub author_email: Option<String>,

    /// Commit as the user with this email.
    #[arg(long, value_name = "EMAIL")]
    pub committer_email: Option<String>,

    /// Act as the configured user with this email.
    #[arg(long = "as", value_name = "EMAIL")]
    pub as_user: Option<String>,
}

impl MutationArgs {
    /// Build the request for `path`.
    #[must_use]
    pub fn request(&self, path: &str) -> MutationRequest {
        MutationRequest {
            last_commit_id: self.last_commit.clone(),
            old_branch: self.branch.clone(),
            new_branch: self.new_branch.clone(),
            tree_path: path.to_string(),
            message: self.message.clone(),
            sha: self.sha.clone(),
            author: self.author_email.clone().map(IdentityOptions::email),
            committer: self.committer_email.clone().map(IdentityOptions::email),
        }
    }
}
