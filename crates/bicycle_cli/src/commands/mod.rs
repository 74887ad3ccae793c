//! CLI command implementations.

pub mod checkpoint;
pub mod exec;
pub mod inspect;
pub mod register;
pub mod verify;

use bicycle_core::{Config, CoreError, Engine};
use std::path::{Path, PathBuf};

/// Errors raised by the commands themselves.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A command needs `--path`.
    #[error("data directory path required for {command}")]
    MissingPath {
        /// Subcommand name.
        command: &'static str,
    },

    /// An `@file` argument could not be read.
    #[error("cannot read {path}: {source}")]
    Input {
        /// File named by the argument.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// An argument is not valid JSON for what it describes.
    #[error("invalid {what}: {source}")]
    Json {
        /// What was being parsed.
        what: &'static str,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Engine failure.
    #[error(transparent)]
    Engine(#[from] CoreError),

    /// The engine answered a request with an error response.
    #[error("request failed")]
    RequestFailed,

    /// `verify` found inconsistent indexes.
    #[error("verification failed: {dangling} dangling, {missing} missing index entries")]
    Inconsistent {
        /// Entries whose record is gone or no longer matches.
        dangling: usize,
        /// Entries a record needs but the index lacks.
        missing: usize,
    },
}

/// Result alias for commands.
pub type CliResult<T> = Result<T, CliError>;

/// Unwraps `--path` or names the command that needed it.
pub fn require_path(path: Option<PathBuf>, command: &'static str) -> CliResult<PathBuf> {
    path.ok_or(CliError::MissingPath { command })
}

/// Reads an inline JSON argument, or the file it names with a leading `@`.
pub fn read_json_arg<T: serde::de::DeserializeOwned>(arg: &str, what: &'static str) -> CliResult<T> {
    let text = match arg.strip_prefix('@') {
        Some(file) => std::fs::read_to_string(file).map_err(|source| CliError::Input {
            path: PathBuf::from(file),
            source,
        })?,
        None => arg.to_owned(),
    };
    serde_json::from_str(&text).map_err(|source| CliError::Json { what, source })
}

/// Opens the engine in `path`, creating the directory only if asked.
pub fn open(path: &Path, create: bool) -> CliResult<Engine> {
    Ok(Engine::open(path, Config::new().create_if_missing(create))?)
}
