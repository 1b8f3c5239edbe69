//! Runtime configuration for the service surface, layered the way
//! `worker::config::Config` does: a `toml` file overridden by
//! `VBA_TOOLKIT__`-prefixed environment variables.
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::time::Duration;
use vba_automation::SessionManagerConfig;

/// Tunables a deployment may want to override without recompiling.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Seconds between idle-session eviction sweeps.
    #[serde(default = "default_eviction_interval_secs")]
    pub eviction_interval_secs: u64,
    /// Seconds a session may sit idle before eviction.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_eviction_interval_secs() -> u64 {
    300
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            eviction_interval_secs: default_eviction_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from `vba-toolkit.toml` in the current directory,
    /// overridden by `VBA_TOOLKIT__*` environment variables. Falls back to
    /// defaults entirely when neither source sets a value.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(Self::default()))
            .merge(Toml::file("vba-toolkit.toml"))
            .merge(Env::prefixed("VBA_TOOLKIT__").split("__"))
            .extract()
    }

    /// Builds the [`SessionManagerConfig`] these tunables describe.
    pub fn session_manager_config(&self) -> SessionManagerConfig {
        SessionManagerConfig {
            eviction_interval: Duration::from_secs(self.eviction_interval_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_session_manager_defaults() {
        let config = ServiceConfig::default();
        let session_config = config.session_manager_config();
        let default_session_config = SessionManagerConfig::default();
        assert_eq!(session_config.eviction_interval, default_session_config.eviction_interval);
        assert_eq!(session_config.idle_timeout, default_session_config.idle_timeout);
    }
}
