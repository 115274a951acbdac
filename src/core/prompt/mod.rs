//! Prompt configuration stores.
//!
//! Each call fetches one [`PromptConfig`] by its configuration key before the
//! upstream session is configured. The bridge depends only on the
//! [`PromptConfigFetcher`] trait; which store backs it is decided at startup:
//!
//! - `PROMPT_STORE_URL` set: [`HttpPromptStore`] (`GET {url}/{key}`)
//! - `PROMPT_STORE_FILE` set: [`FilePromptStore`] (JSON or YAML map)
//! - neither: [`BuiltinPromptStore`], a single customer-service prompt

mod builtin;
mod file;
mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use builtin::{BUILTIN_ORGANIZATION, BuiltinPromptStore};
pub use file::FilePromptStore;
pub use remote::HttpPromptStore;

use crate::config::ServerConfig;

/// Prompt, tools and branding for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// System instructions for the session
    #[serde(alias = "instructions")]
    pub prompt: String,
    /// Function tool definitions, sent to the AI service verbatim
    #[serde(default, alias = "tools")]
    pub functions: Vec<serde_json::Value>,
    /// Name the assistant greets callers with
    #[serde(default)]
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("No prompt configuration found for key '{0}'")]
    NotFound(String),

    #[error("Prompt store request failed: {0}")]
    Request(String),

    #[error("Invalid prompt configuration: {0}")]
    Invalid(String),

    #[error("Prompt store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Prompt fetch timed out after {0:?}")]
    Timeout(Duration),
}

pub type PromptResult<T> = Result<T, PromptError>;

/// Fetch the prompt configuration for a call.
#[async_trait]
pub trait PromptConfigFetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> PromptResult<PromptConfig>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

pub type SharedPromptFetcher = Arc<dyn PromptConfigFetcher>;

/// Pick the prompt store the server configuration asks for.
pub fn create_prompt_fetcher(
    config: &ServerConfig,
    client: reqwest::Client,
) -> PromptResult<SharedPromptFetcher> {
    if let Some(url) = &config.prompt_store_url {
        let store = HttpPromptStore::new(client, url, config.prompt_store_token.clone())?;
        return Ok(Arc::new(store));
    }
    if let Some(path) = &config.prompt_store_file {
        return Ok(Arc::new(FilePromptStore::load(path)?));
    }
    Ok(Arc::new(BuiltinPromptStore::default()))
}
