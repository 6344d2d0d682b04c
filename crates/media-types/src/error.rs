use thiserror::Error;

/// Result alias used across the import crates.
pub type Result<T> = std::result::Result<T, ImportError>;

/// Unified error taxonomy of the importer layer.
///
/// Parse-level hiccups (a corrupt header, a bad PES length) are not errors:
/// parsers log a warning and resync. Only conditions that end the current
/// import session surface here.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Caller passed an invalid argument or an inconsistent request.
    #[error("bad parameter: {0}")]
    BadParam(String),
    /// The input file or companion file could not be located.
    #[error("cannot open {0}")]
    UrlError(String),
    /// The source failed while reading or seeking.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Structural damage that parsing cannot recover from.
    #[error("non-compliant bitstream: {0}")]
    NonCompliantBitstream(String),
    /// Recognized but unsupported input (codec, profile, signaling combo).
    #[error("not supported: {0}")]
    NotSupported(String),
    /// An allocation was refused.
    #[error("out of memory")]
    OutOfMem,
}

impl ImportError {
    /// Shorthand for [`ImportError::NonCompliantBitstream`].
    pub fn non_compliant(msg: impl Into<String>) -> Self {
        ImportError::NonCompliantBitstream(msg.into())
    }
}
