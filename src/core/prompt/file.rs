use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::{PromptConfig, PromptConfigFetcher, PromptError, PromptResult};

/// Prompt configurations loaded once from a local file.
///
/// The file is a map of configuration key to [`PromptConfig`], written as
/// YAML (`.yaml`/`.yml`) or JSON (anything else).
#[derive(Debug, Clone, Default)]
pub struct FilePromptStore {
    entries: HashMap<String, PromptConfig>,
}

impl FilePromptStore {
    pub fn load(path: &Path) -> PromptResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml" | "yml")
        );

        let entries: HashMap<String, PromptConfig> = if is_yaml {
            serde_yaml::from_str(&contents).map_err(|e| PromptError::Invalid(e.to_string()))?
        } else {
            serde_json::from_str(&contents).map_err(|e| PromptError::Invalid(e.to_string()))?
        };

        info!(
            path = %path.display(),
            entries = entries.len(),
            "Loaded prompt configurations"
        );
        Ok(Self { entries })
    }

    pub fn from_entries(entries: HashMap<String, PromptConfig>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PromptConfigFetcher for FilePromptStore {
    async fn fetch(&self, key: &str) -> PromptResult<PromptConfig> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| PromptError::NotFound(key.to_string()))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
