use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure the archive core can report.
///
/// All variants are recoverable at the caller boundary; nothing in the crate
/// retries on its own.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Path is not allowed by the whitelist: {0}")]
    NotWhitelisted(String),
    #[error("Path is on the ignore list: {0}")]
    Ignored(String),
    #[error("An entry with this path already exists: {0}")]
    DuplicatePath(String),
    #[error("No entry with this path: {0}")]
    NotFound(String),
    #[error("Invalid addon type: {0:?}")]
    InvalidType(String),
    #[error("Invalid tag: {0:?}")]
    InvalidTag(String),
    #[error("Malformed container: {0}")]
    MalformedContainer(String),
    #[error("Field `{field}` contains a NUL byte and cannot be encoded")]
    EmbeddedNul { field: &'static str },
    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    /// `bytes_written` is what reached the backing store before the failure.
    /// The store is left as-is; there is no rollback.
    #[error("IO error after {bytes_written} byte(s) written: {source}")]
    IoFailure {
        #[source]
        source: io::Error,
        bytes_written: u64,
    },
}

impl ArchiveError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ArchiveError::MalformedContainer(msg.into())
    }
}

impl From<io::Error> for ArchiveError {
    fn from(source: io::Error) -> Self {
        ArchiveError::IoFailure { source, bytes_written: 0 }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
