//! Register command implementation.

use super::{open, read_json_arg, CliResult};
use bicycle_core::{Engine, ModelDef};
use std::path::Path;

/// Registers the model described by `schema`.
pub fn run(path: &Path, schema: &str) -> CliResult<()> {
    let def: ModelDef = read_json_arg(schema, "model definition")?;
    let engine = open(path, true)?;
    let summary = register(&engine, def)?;
    println!("{summary}");
    engine.close()?;
    Ok(())
}

/// Registers `def` and describes the installed model.
pub fn register(engine: &Engine, def: ModelDef) -> CliResult<String> {
    let model = engine.register(def)?;
    let indexes: Vec<&str> = model.indexes().iter().map(|i| i.name()).collect();
    Ok(format!(
        "Registered {} (primary key: {}; indexes: {})",
        model.name(),
        model.primary_key().fields().join(", "),
        if indexes.is_empty() {
            "none".to_owned()
        } else {
            indexes.join(", ")
        }
    ))
}
