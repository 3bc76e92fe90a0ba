//! Shared agent state handed to background tasks and HTTP handlers.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::metrics::SharedProvider;
use crate::registry::ConnectionRegistry;
use crate::store::SampleStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: SharedProvider,
    pub store: SampleStore,
    pub registry: Arc<ConnectionRegistry>,

    // Last broadcast event as JSON, sent to viewers as soon as they connect
    pub last_json: Arc<RwLock<String>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        provider: SharedProvider,
        store: SampleStore,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            config,
            provider,
            store,
            registry,
            last_json: Arc::new(RwLock::new(String::new())),
        }
    }
}
