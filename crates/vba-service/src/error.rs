//! Uniform error surface (§7): every failure is reported with the
//! operation that was attempted, the path it was attempted against, and
//! the underlying typed cause.
use thiserror::Error;

/// The underlying cause of a [`ServiceError`], carried through from the
/// layer that actually failed.
#[derive(Debug, Error)]
pub enum ServiceCause {
    /// A read-path (C1-C4) failure.
    #[error(transparent)]
    Core(#[from] vba_core::VbaError),
    /// A host-automation or write-path (C9-C14) failure.
    #[error(transparent)]
    Automation(#[from] vba_automation::AutomationError),
    /// The operation has no implementation in this workspace (e.g. the
    /// form-definition tools, which have no grounded host-binding surface).
    #[error("{0}")]
    Unsupported(String),
}

/// A failed operation, formatted uniformly with path/operation/cause
/// context, as §7 requires of the service surface.
#[derive(Debug, Error)]
#[error("{operation} on {path}: {cause}")]
pub struct ServiceError {
    /// The tool operation that was attempted.
    pub operation: &'static str,
    /// The container path it was attempted against.
    pub path: String,
    /// The underlying cause.
    #[source]
    pub cause: ServiceCause,
}

/// This crate's `Result` alias.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Extension trait attaching operation/path context to a lower-layer
/// `Result`, turning it into a [`ServiceError`] on failure.
pub trait Context<T> {
    /// Wraps an `Err` with `operation`/`path` context; passes `Ok` through.
    fn ctx(self, operation: &'static str, path: &std::path::Path) -> Result<T>;
}

impl<T, E: Into<ServiceCause>> Context<T> for std::result::Result<T, E> {
    fn ctx(self, operation: &'static str, path: &std::path::Path) -> Result<T> {
        self.map_err(|e| ServiceError {
            operation,
            path: path.display().to_string(),
            cause: e.into(),
        })
    }
}
