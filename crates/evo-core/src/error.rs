use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the core model.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed artifact: {0}")]
    MalformedArtifact(#[source] serde_json::Error),

    #[error("invalid schema document {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid ledger {path}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("version {0} is the last representable version")]
    VersionOverflow(u32),

    #[error("unknown milestone property: {0}")]
    UnknownMilestone(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
