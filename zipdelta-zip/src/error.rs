use thiserror::Error;

/// Structural/semantic failures surfaced by the ZIP parser.
///
/// These map onto the `INVALID_INPUT` / `UNSUPPORTED_ARCHIVE` members of the
/// external error surface; the delta engine crate wraps this enum rather than
/// duplicating its variants.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a valid ZIP archive: {0}")]
    MalformedArchive(String),

    #[error("archive uses an unsupported feature: {0}")]
    UnsupportedArchive(String),

    #[error("entry {0:?} not found in archive")]
    EntryNotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
