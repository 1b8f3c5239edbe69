//! Backup management, host-session lifecycle and the macro edit/data/
//! invocation/query bridges that sit on top of [`vba_core`]'s read path.
//!
//! Write path: [`backup`] (C9) keeps rollback material; [`session`] (C10)
//! owns the registry of live host handles; [`edit`] (C11) drives a
//! validate-open-mutate-compile-save-verify-or-rollback pipeline over a
//! session; [`data_io`] (C12), [`invoke`] (C13) and [`query`] (C14) are
//! thin bridges that read/write host state once a session exists.
#![warn(missing_docs)]

pub mod backup;
#[cfg(all(windows, feature = "automation"))]
mod com;
pub mod data_io;
pub mod edit;
mod error;
pub mod invoke;
pub mod query;
pub mod session;
mod stub;
pub mod validate;

pub use backup::{BackupEntry, BackupManager};
pub use error::{AutomationError, Result};
pub use session::{AppFamily, AutomationValue, HostBinding, Session, SessionManager, SessionManagerConfig};
pub use stub::default_binding;
