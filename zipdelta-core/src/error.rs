use thiserror::Error;

/// The external error surface described in spec.md §6.
///
/// Each variant carries a one-line cause and, where one exists, the
/// offending offset or entry path (§7 "user-visible behaviour"), rather
/// than relying on free-form context strings the way the teacher's
/// `anyhow`-based call sites do.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unsupported archive feature: {0}")]
    UnsupportedArchive(String),

    #[error("DEFLATE implementation is not byte-reproducible: {0}")]
    IncompatibleDeflate(String),

    #[error("patch corrupt at offset {offset}: {reason}")]
    PatchCorrupt { offset: u64, reason: String },

    #[error("output mismatch for {path:?}: {reason}")]
    OutputMismatch { path: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<zipdelta_zip::Error> for Error {
    fn from(value: zipdelta_zip::Error) -> Self {
        match value {
            zipdelta_zip::Error::MalformedArchive(reason) => Error::InvalidInput(reason),
            zipdelta_zip::Error::UnsupportedArchive(reason) => Error::UnsupportedArchive(reason),
            zipdelta_zip::Error::EntryNotFound(name) => {
                Error::InvalidInput(format!("entry not found: {name}"))
            }
            zipdelta_zip::Error::Cancelled => Error::Cancelled,
            zipdelta_zip::Error::Io(err) => Error::Io(err),
        }
    }
}

impl Error {
    pub fn patch_corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Error::PatchCorrupt {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
