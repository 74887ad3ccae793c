//! Verify command implementation.

use super::{open, CliError, CliResult};
use bicycle_core::VerifyReport;
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path) -> CliResult<()> {
    println!("Verifying data directory at {}", path.display());
    println!();

    let engine = open(path, false)?;
    let report = engine.verify()?;
    engine.close()?;

    print_report(&report);
    println!();
    check(&report)?;
    println!("✓ Index verification passed");
    Ok(())
}

fn print_report(report: &VerifyReport) {
    if report.models.is_empty() {
        println!("No models registered");
    }
    for model in &report.models {
        let mark = if model.is_consistent() { "✓" } else { "✗" };
        println!(
            "{mark} {}: {} records, {} index entries, {} dangling, {} missing",
            model.model, model.records, model.index_entries, model.dangling, model.missing
        );
    }
}

/// Turns an inconsistent report into an error.
pub fn check(report: &VerifyReport) -> CliResult<()> {
    if report.is_consistent() {
        Ok(())
    } else {
        Err(CliError::Inconsistent {
            dangling: report.dangling(),
            missing: report.missing(),
        })
    }
}
