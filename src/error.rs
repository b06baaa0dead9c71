//! Error taxonomy for the storage engine.
//!
//! A torn log tail and an incomplete cached day are expected, recoverable
//! states and are reported as values (`ReadOutcome`, boolean results), never
//! through this type. `LogError` covers the genuinely failing paths: I/O,
//! undecodable interior records, remote-service failures and conversion
//! integrity violations.

use thiserror::Error;

use crate::service::ServiceError;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("undecodable record at line {line}: {message}")]
    Codec { line: usize, message: String },
    #[error("market service error: {0}")]
    Service(#[from] ServiceError),
    #[error("integrity violation during {operation}: {message}")]
    Integrity { operation: String, message: String },
}

impl LogError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn codec(line: usize, message: impl Into<String>) -> Self {
        LogError::Codec {
            line,
            message: message.into(),
        }
    }
}
