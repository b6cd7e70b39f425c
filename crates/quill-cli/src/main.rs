//! Quill CLI - transactional single-file edits on git branches.

use clap::Parser;

mod commands;
mod logging;
mod output;

use commands::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    output::set_quiet(cli.quiet);
    logging::init(cli.verbose);
    let global = cli.global();

    let result = match cli.command {
        Commands::Delete { path, args } => commands::delete::run(&global, &path, &args),
        Commands::Write {
            path,
            from,
            create,
            args,
        } => commands::write::run(&global, &path, &from, create, &args),
        Commands::Completions { shell } => commands::completions::run(shell),
    };

    if let Err(e) = result {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
