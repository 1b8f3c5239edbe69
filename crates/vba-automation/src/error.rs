use thiserror::Error;

/// Errors surfaced by the write path (backups, sessions, edit/data/query/
/// invocation bridges).
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Pre- or post-validation failed.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The file is held exclusively by an uncontrolled process.
    #[error("{path} is locked: {reason}")]
    Locked {
        /// The container path.
        path: String,
        /// Why the lock could not be acquired.
        reason: String,
    },
    /// The host forbids project-model access (trust setting).
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// No host automation binding is available on this platform.
    #[error("host automation is not available on this platform")]
    UnsupportedPlatform,
    /// The session's liveness probe failed; the caller should retry.
    #[error("session for {0} is dead")]
    SessionDead(String),
    /// A range operation exceeded the cell-count ceiling.
    #[error("range of {cells} cells exceeds the limit of {limit}")]
    RangeTooLarge {
        /// Requested cell count.
        cells: u64,
        /// The ceiling.
        limit: u64,
    },
    /// A SQL statement failed against a database session.
    #[error("query failed: {query}: {reason}")]
    Sql {
        /// The offending query text.
        query: String,
        /// The host's reported reason.
        reason: String,
    },
    /// Post-save verification found a mismatch and the backup could not be
    /// restored either.
    #[error("could not restore backup at {0}")]
    RollbackFailed(String),
    /// Post-save verification found the persisted module didn't match what
    /// was written; `recovery` describes what happened as a result (backup
    /// restored, or a manual-recovery pointer when the file couldn't be
    /// safely overwritten).
    #[error("verification failed for module {module}: {recovery}")]
    VerificationFailed {
        /// The module that failed verification.
        module: String,
        /// What recovery action was taken or is needed.
        recovery: String,
    },
    /// No invocation format for a macro reference succeeded against the host.
    #[error("macro '{name}' not found; formats tried: {tried:?}; available: {available:?}")]
    MacroNotFound {
        /// The macro reference as requested.
        name: String,
        /// The qualified invocation strings that were attempted.
        tried: Vec<String>,
        /// The macros the host actually enumerates.
        available: Vec<String>,
    },
    /// A module was addressed by name but is not present.
    #[error("module not found: {name} (available: {available:?})")]
    ModuleNotFound {
        /// The requested module name.
        name: String,
        /// The module names that do exist.
        available: Vec<String>,
    },
    /// The read path (C1-C4) failed while opening the container.
    #[error(transparent)]
    Core(#[from] vba_core::VbaError),
    /// Manifest (de)serialization failure.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias for this crate's `Result`.
pub type Result<T> = std::result::Result<T, AutomationError>;
