use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to fetch {context}: {source}")]
    Fetch {
        context: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid version {version:?} in {input:?}")]
    InvalidVersionSpec { input: String, version: String },

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("No info.json found in {0:?}")]
    MissingManifest(PathBuf),

    #[error("Checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to resolve {name}: {source}")]
    Resolve {
        name: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Builds a `map_err` adapter attaching `context` to an I/O error.
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Error {
        let context = context.into();
        move |source| Error::Io { context, source }
    }

    pub(crate) fn resolve(name: &str) -> impl FnOnce(Error) -> Error + '_ {
        move |source| Error::Resolve {
            name: name.to_string(),
            source: Box::new(source),
        }
    }
}
