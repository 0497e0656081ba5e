//! Error types shared by the scanner and the analysis pass.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for scan and analysis operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors raised while planning, scanning, or analyzing.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bad frequency plan input. Fatal before any scanning starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A decoder line could not be turned into a record.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The decoder could not be started or supervised.
    #[error("Decoder process error: {0}")]
    Process(String),

    /// Operator interrupt.
    #[error("Scan cancelled by operator")]
    Cancelled,

    /// A report held nothing worth analyzing.
    #[error("No usable data in {}: {reason}", path.display())]
    NoData { path: PathBuf, reason: String },

    /// Filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Structured artifact could not be serialized or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ScanError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error when it reaches `main`.
    pub fn exit_code(&self) -> i32 {
        match self {
            ScanError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Reasons a single decoder output line is dropped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("record has no radio ID")]
    MissingId,

    #[error("radio ID is not an integer: {0}")]
    InvalidId(String),
}
