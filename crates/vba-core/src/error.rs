use thiserror::Error;

/// Errors surfaced by the read path (C1 package reader through C4 project model).
#[derive(Debug, Error)]
pub enum VbaError {
    /// The container file does not exist.
    #[error("container not found: {0}")]
    NotFound(String),
    /// The file suffix is not one of the recognized container variants.
    #[error("unsupported container suffix: {0}")]
    UnsupportedFormat(String),
    /// A ZIP, compound-file or module-stream structural invariant was violated.
    #[error("format error: {0}")]
    FormatError(String),
    /// The container is valid but carries no macro project; not always an error.
    #[error("no macro payload present")]
    NoMacroPayload,
    /// A module was addressed by name but is not present in the project.
    #[error("module not found: {name} (available: {available:?})")]
    ModuleNotFound {
        /// The requested, unresolved module name.
        name: String,
        /// The module names that do exist in the project.
        available: Vec<String>,
    },
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<vba_ole::OleError> for VbaError {
    fn from(e: vba_ole::OleError) -> Self {
        match e {
            vba_ole::OleError::Io(io) => VbaError::Io(io),
            other => VbaError::FormatError(other.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for VbaError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => VbaError::Io(io),
            other => VbaError::FormatError(other.to_string()),
        }
    }
}

/// Convenience alias for this crate's `Result`.
pub type Result<T> = std::result::Result<T, VbaError>;
