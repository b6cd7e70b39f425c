//! `quill write` command - Create or replace a file on a branch.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use quill_core::WriteMode;

use super::utils;
use super::{Global, MutationArgs};

/// Run the write command.
pub fn run(
    global: &Global,
    path: &str,
    from: &Path,
    create: bool,
    args: &MutationArgs,
) -> Result<()> {
    let content = read_content(from)?;
    let mode = if create {
        WriteMode::Create
    } else {
        WriteMode::Update
    };

    let request = args.request(path);
    utils::mutate(global, args, |mutator, doer| {
        mutator.write_file(doer, &request, &content, mode)
    })
}

fn read_content(from: &Path) -> Result<Vec<u8>> {
    if from == Path::new("-") {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read content from stdin")?;
        return Ok(buf);
    }
    fs::read(from).with_context(|| format!("Failed to read {}", from.display()))
}
