/// Helper utilities for nextvault

use anyhow::{Context, Result};
use std::io::{self, Write};

/// Console output with a global quiet switch. Progress goes to stdout and
/// is silenced by `--quiet`; failures always reach stderr.
pub struct Console {
    quiet: bool,
}

impl Console {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{msg}");
        }
    }

    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("✓ {msg}");
        }
    }

    pub fn failure(&self, msg: &str) {
        eprintln!("✗ {msg}");
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("⚠ {msg}");
    }
}

/// Only an explicit "yes" confirms; everything else declines.
pub fn is_affirmative(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("yes")
}

/// Ask for confirmation on the terminal. `assume_yes` (the `--yes` flag)
/// skips the prompt entirely.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    print!("{prompt} [yes/no]: ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("Failed to read from stdin")?;
    Ok(is_affirmative(&answer))
}

/// Parse a 1-based menu selection. Blank input or anything out of range
/// means "no choice".
pub fn parse_selection(input: &str, len: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    if n >= 1 && n <= len {
        Some(n - 1)
    } else {
        None
    }
}

/// Present a numbered menu on the terminal and return the chosen index.
pub fn select_from(prompt: &str, items: &[String]) -> Result<Option<usize>> {
    if items.is_empty() {
        return Ok(None);
    }

    println!("{prompt}");
    for (i, item) in items.iter().enumerate() {
        println!("  {}) {item}", i + 1);
    }
    print!("Selection (empty to abort): ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("Failed to read from stdin")?;
    Ok(parse_selection(&answer, items.len()))
}
