//! Exec command implementation.

use super::{open, read_json_arg, CliError, CliResult};
use bicycle_core::{Engine, RequestEnvelope, ResponseEnvelope};
use std::path::Path;

/// Runs one request envelope and prints the response envelope as JSON.
///
/// An error response is still printed, then reported as a failure so the
/// process exits non-zero.
pub fn run(path: &Path, request: &str) -> CliResult<()> {
    let envelope: RequestEnvelope = read_json_arg(request, "request")?;
    let engine = open(path, false)?;
    let reply = exec(&engine, envelope);
    engine.close()?;

    let json = serde_json::to_string_pretty(&reply).map_err(|source| CliError::Json {
        what: "response",
        source,
    })?;
    println!("{json}");
    match reply.response.error_kind() {
        Some(_) => Err(CliError::RequestFailed),
        None => Ok(()),
    }
}

/// Hands `envelope` to the engine.
pub fn exec(engine: &Engine, envelope: RequestEnvelope) -> ResponseEnvelope {
    tracing::debug!(op = envelope.request.op(), version = envelope.version, "exec");
    engine.handle(envelope)
}
