use thiserror::Error;

/// Errors raised while parsing a Compound File Binary (OLE2) container.
#[derive(Debug, Error)]
pub enum OleError {
    /// The byte stream does not start with the CFB magic number.
    #[error("not a compound file (bad signature)")]
    BadSignature,
    /// A structural invariant (sector size, FAT chain, directory entry) was violated.
    #[error("corrupt compound file structure: {0}")]
    Corrupt(String),
    /// The requested entry does not exist under the given path.
    #[error("entry not found: {0}")]
    NotFound(String),
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias for this crate's `Result`.
pub type Result<T> = std::result::Result<T, OleError>;
