use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use super::{PromptConfig, PromptConfigFetcher, PromptError, PromptResult};

/// Remote key-value prompt store.
///
/// `fetch("123")` issues `GET {base_url}/123` with an optional bearer token
/// and expects a [`PromptConfig`] JSON body. A 404 maps to
/// [`PromptError::NotFound`].
#[derive(Clone)]
pub struct HttpPromptStore {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for HttpPromptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPromptStore")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpPromptStore {
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<String>) -> PromptResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PromptError::Invalid(format!("prompt store URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PromptError::Invalid(format!(
                "prompt store URL '{base_url}' cannot carry a key path"
            )));
        }
        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn key_url(&self, key: &str) -> PromptResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PromptError::Invalid("prompt store URL cannot carry a key path".to_string()))?
            .pop_if_empty()
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl PromptConfigFetcher for HttpPromptStore {
    async fn fetch(&self, key: &str) -> PromptResult<PromptConfig> {
        let url = self.key_url(key)?;
        debug!(%url, "Fetching prompt configuration");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PromptError::Request(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<PromptConfig>()
                .await
                .map_err(|e| PromptError::Invalid(e.to_string())),
            StatusCode::NOT_FOUND => Err(PromptError::NotFound(key.to_string())),
            status => Err(PromptError::Request(format!("unexpected status {status}"))),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
