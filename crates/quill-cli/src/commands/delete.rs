//! `quill delete` command - Delete a file from a branch.

use anyhow::Result;

use super::utils;
use super::{Global, MutationArgs};

/// Run the delete command.
pub fn run(global: &Global, path: &str, args: &MutationArgs) -> Result<()> {
    let request = args.request(path);
    utils::mutate(global, args, |mutator, doer| {
        mutator.delete_file(doer, &request)
    })
}
