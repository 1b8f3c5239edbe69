//! The service surface's runtime: one process-wide [`SessionManager`] plus
//! the configuration it was built from.
use crate::config::ServiceConfig;
use std::sync::Arc;
use vba_automation::{default_binding, SessionManager};

/// Everything an [`crate::Operation`] needs to run. Cheap to clone (an
/// `Arc` around the registry); construct one per process.
#[derive(Clone)]
pub struct ServiceContext {
    pub(crate) sessions: Arc<SessionManager>,
}

impl ServiceContext {
    /// Builds a context from `config`, wiring the platform-appropriate
    /// host binding ([`vba_automation::default_binding`]) into a fresh
    /// session registry.
    pub fn new(config: &ServiceConfig) -> Self {
        let sessions = SessionManager::new(Arc::new(default_binding), config.session_manager_config());
        Self { sessions }
    }

    /// The underlying session registry, for callers that need direct
    /// access (e.g. the idle-eviction background task).
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::new(&ServiceConfig::default())
    }
}
