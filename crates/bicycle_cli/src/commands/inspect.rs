//! Inspect command implementation.

use super::{open, CliError, CliResult};
use bicycle_core::{Engine, EngineStats};
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Engine counters.
    #[serde(flatten)]
    pub stats: EngineStats,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let engine = open(path, false)?;
    let result = inspect(&engine, path)?;
    engine.close()?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&result).map_err(|source| CliError::Json {
                what: "inspection result",
                source,
            })?;
            println!("{json}");
        }
        _ => print!("{}", render_text(&result)),
    }
    Ok(())
}

/// Collects counters from an open engine.
pub fn inspect(engine: &Engine, path: &Path) -> CliResult<InspectResult> {
    Ok(InspectResult {
        path: path.display().to_string(),
        stats: engine.stats()?,
    })
}

fn render_text(result: &InspectResult) -> String {
    use std::fmt::Write;

    let stats = &result.stats;
    let mut out = String::new();
    let _ = writeln!(out, "Bicycle Data Directory");
    let _ = writeln!(out, "======================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Path:       {}", result.path);
    let _ = writeln!(out, "Durability: {:?}", stats.durability);
    let _ = writeln!(out);
    let _ = writeln!(out, "Storage:");
    match stats.log_bytes {
        Some(bytes) => {
            let _ = writeln!(out, "  Log size:      {}", format_size(bytes));
        }
        None => {
            let _ = writeln!(out, "  Log size:      (no log)");
        }
    }
    let _ = writeln!(out, "  Live keys:     {}", stats.live_keys);
    let _ = writeln!(out, "  Versions:      {}", stats.versions);
    let _ = writeln!(out, "  Committed seq: {}", stats.committed_seq);
    let _ = writeln!(out);
    let _ = writeln!(out, "Models:");
    if stats.models.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for model in &stats.models {
        let _ = writeln!(
            out,
            "  {} - {} records, {} indexes",
            model.name, model.records, model.indexes
        );
    }
    out
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
