// src/error.rs

use crate::archive::tar::TarError;
use thiserror::Error;

/// Core error types for archdeps
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Resource initialization error (worker pool, HTTP client)
    #[error("Failed to initialize: {0}")]
    InitError(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Mirror unreachable or returned an error status
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Network operation exceeded its timeout
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Corrupt or unrecognized compressed stream
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Malformed TAR container
    #[error("Malformed archive: {0}")]
    Tar(#[from] TarError),

    /// Malformed descriptor record
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Descriptor record uses a field the parser does not know
    #[error("Unknown descriptor field %{0}%")]
    UnknownField(String),

    /// JSON value has the wrong type for its descriptor field
    #[error("Field {field}: expected {expected} but got {found}")]
    JsonType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Descriptor finished parsing without a name
    #[error("Descriptor has no name")]
    MissingName,

    /// Contributed-source RPC answered with an error
    #[error("Remote error: {0}")]
    RemoteError(String),

    /// No package satisfies a dependency
    #[error("Unable to find candidate for dependency {dependency} required by {required_by}")]
    MissingCandidate {
        dependency: String,
        required_by: String,
    },

    /// Dependency constraints admit no solution
    #[error("Unable to find a solution for the requested dependency set")]
    Unsatisfiable,

    /// State the implementation believes cannot occur
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for invariant violations that should be reported as bugs
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }

    /// True for network failures that another mirror may not hit
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::DownloadError(_) | Error::Timeout(_))
    }
}

/// Result type alias using archdeps' Error type
pub type Result<T> = std::result::Result<T, Error>;
