//! Crate-wide error type.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors that can occur while ordering sequence records.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid usage: {0}")]
    Usage(String),

    #[error("Failed to launch {tool} ({binary}): {source}")]
    Spawn {
        tool: &'static str,
        binary: PathBuf,
        source: io::Error,
    },

    #[error("{tool} exited with {status}:\n{diagnostics}")]
    Tool {
        tool: &'static str,
        status: ExitStatus,
        diagnostics: String,
    },

    #[error("Not supported format: {0}")]
    IncompatibleFormat(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a usage error from anything printable.
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage(message.into())
    }
}
