//! Checkpoint command implementation.

use super::{open, CliResult};
use std::path::Path;

/// Compacts the log and prints its size before and after.
pub fn run(path: &Path) -> CliResult<()> {
    let engine = open(path, false)?;
    let before = engine.stats()?.log_bytes.unwrap_or(0);
    let after = engine.checkpoint()?;
    engine.close()?;

    println!("Checkpoint complete: log {before} -> {after} bytes");
    Ok(())
}
