//! Typed tool-dispatch surface (C15) over [`vba_core`]'s read path and
//! [`vba_automation`]'s write/automation path: one [`ops::Operation`]
//! variant per named tool, routed through [`ops::execute`] to a single
//! [`ops::OperationOutput`] result type, with every failure reported as a
//! uniformly-formatted [`error::ServiceError`].
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod ops;

pub use config::ServiceConfig;
pub use context::ServiceContext;
pub use error::{ServiceCause, ServiceError};
pub use ops::{execute, Operation, OperationOutput};
