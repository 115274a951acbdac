use async_trait::async_trait;

use super::{PromptConfig, PromptConfigFetcher, PromptResult};

pub const BUILTIN_ORGANIZATION: &str = "U+ Bank";

const BUILTIN_PROMPT: &str = "Assume the role of a customer service representative working for U+ Bank. \
Your job is to assist customers in the call center. You can assist customers with the following tasks:
-Address Change (Street, city, state, zipcode)
-File a complaint (location, date, complain details)
For each task you must collect the required data indicated within the parenthesis
";

/// Serves the same configuration for every key.
#[derive(Debug, Clone)]
pub struct BuiltinPromptStore {
    config: PromptConfig,
}

impl BuiltinPromptStore {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }
}

impl Default for BuiltinPromptStore {
    fn default() -> Self {
        Self::new(PromptConfig {
            prompt: BUILTIN_PROMPT.to_string(),
            functions: Vec::new(),
            organization: BUILTIN_ORGANIZATION.to_string(),
            temperature: None,
        })
    }
}

#[async_trait]
impl PromptConfigFetcher for BuiltinPromptStore {
    async fn fetch(&self, _key: &str) -> PromptResult<PromptConfig> {
        Ok(self.config.clone())
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}
