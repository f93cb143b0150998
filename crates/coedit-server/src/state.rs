//! Shared application state.

use crate::config::Config;
use coedit_core::{HttpStore, ProjectStore, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Config,
}

impl AppState {
    /// State backed by the configured HTTP persistence backend.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(HttpStore::new(
            config.store_url.clone(),
            Duration::from_secs(config.store_timeout_secs),
        )?);
        Ok(Self::with_store(config, store))
    }

    /// State with an explicit store, used by tests.
    pub fn with_store(config: Config, store: Arc<dyn ProjectStore>) -> Self {
        Self { registry: SessionRegistry::new(store), config }
    }
}
