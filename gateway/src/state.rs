//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::core::bridge::{AiConnector, BridgeOrchestrator};
use crate::core::realtime::OpenAIRealtimeConnector;

pub struct AppState {
    pub config: ServerConfig,
    pub orchestrator: BridgeOrchestrator,
    pub started_at: Instant,
}

impl AppState {
    /// Build the state with the OpenAI Realtime connector.
    ///
    /// Fails when the OpenAI API key is missing.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, String> {
        let connector = OpenAIRealtimeConnector::new(config.realtime_config()?);
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Build the state around any AI connector.
    pub fn with_connector(config: ServerConfig, connector: Arc<dyn AiConnector>) -> Arc<Self> {
        let orchestrator = BridgeOrchestrator::new(config.bridge.clone(), connector);
        Arc::new(Self {
            config,
            orchestrator,
            started_at: Instant::now(),
        })
    }
}
