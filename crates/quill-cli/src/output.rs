//! Terminal output formatting utilities.

use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;

static QUIET_MODE: AtomicBool = AtomicBool::new(false);

/// Set quiet mode globally. Call once at startup.
pub fn set_quiet(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET_MODE.load(Ordering::Relaxed)
}

/// Print a success message (suppressed in quiet mode).
pub fn success(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "✓".green(), msg);
    }
}

/// Print an error message (always prints to stderr).
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message (always prints to stderr).
pub fn warn(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print an info message (suppressed in quiet mode).
pub fn info(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "→".blue(), msg);
    }
}

/// Print essential machine-readable output (always prints).
///
/// Use for results that should be available for piping, like commit hashes.
pub fn essential(msg: &str) {
    println!("{msg}");
}

/// Abbreviated, dimmed object hash for display.
#[must_use]
pub fn short_hash(hash: &str) -> String {
    hash.get(..12).unwrap_or(hash).dimmed().to_string()
}

/// Highlighted branch name.
#[must_use]
pub fn branch(name: &str) -> String {
    name.cyan().bold().to_string()
}

/// Print an aligned `label value` line under a result (suppressed in quiet mode).
pub fn field(label: &str, value: &str) {
    if !is_quiet() {
        println!("{}", field_line(label, value));
    }
}

fn field_line(label: &str, value: &str) -> String {
    format!("  {label:<8}{value}")
}
