//! Shared application state.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::bridge::{AcknowledgeToolCalls, CallContext, SharedToolHandler};
use crate::core::prompt::{PromptError, SharedPromptFetcher, create_prompt_fetcher};
use crate::core::realtime::{OpenAIRealtime, RealtimeError, SharedConnector};
use crate::core::registry::{ActiveCalls, ObserverRegistry};

/// Timeout for outbound HTTP requests (prompt store, ingest forwarding).
const HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to create prompt store: {0}")]
    Prompt(#[from] PromptError),

    #[error("Failed to create realtime connector: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// State shared by every route.
pub struct AppState {
    pub config: ServerConfig,
    pub observers: ObserverRegistry,
    pub active_calls: ActiveCalls,
    pub prompts: SharedPromptFetcher,
    pub tools: SharedToolHandler,
    pub connector: SharedConnector,
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Build production state from configuration.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_CLIENT_TIMEOUT)
            .build()?;
        let prompts = create_prompt_fetcher(&config, http_client.clone())?;
        let connector: SharedConnector = Arc::new(OpenAIRealtime::new(config.realtime_config())?);

        info!(
            prompt_store = prompts.name(),
            model = %config.realtime_model,
            "Application state initialized"
        );

        Ok(Self::with_components(
            config,
            prompts,
            Arc::new(AcknowledgeToolCalls),
            connector,
            http_client,
        ))
    }

    /// Assemble state from explicit collaborators.
    pub fn with_components(
        config: ServerConfig,
        prompts: SharedPromptFetcher,
        tools: SharedToolHandler,
        connector: SharedConnector,
        http_client: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            observers: ObserverRegistry::new(),
            active_calls: ActiveCalls::new(),
            prompts,
            tools,
            connector,
            http_client,
        })
    }

    /// Collaborators handed to each new call.
    pub fn call_context(&self) -> CallContext {
        CallContext {
            connector: self.connector.clone(),
            prompts: self.prompts.clone(),
            tools: self.tools.clone(),
            observers: self.observers.clone(),
            active_calls: self.active_calls.clone(),
            settings: self.config.bridge_settings(),
            configure_delay: self.config.session_configure_delay(),
            prompt_fetch_timeout: self.config.prompt_fetch_timeout(),
        }
    }
}
