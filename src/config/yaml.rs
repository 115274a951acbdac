use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional; anything left out keeps its environment or
/// default value.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 4000
///   tls:
///     cert_path: "/etc/relay/cert.pem"
///     key_path: "/etc/relay/key.pem"
///
/// openai:
///   api_key: "sk-..."
///   model: "gpt-4o-realtime-preview-2024-10-01"
///   voice: "alloy"
///   temperature: 0.8
///   connect_timeout_seconds: 10
///   configure_delay_ms: 100
///
/// prompts:
///   store_url: "https://kv.example.com/prompts"
///   store_token: "kv-token"
///   store_file: "/etc/relay/prompts.json"
///   fetch_timeout_seconds: 10
///
/// ingest:
///   forward_url: "https://processing.example.com/ingest"
///
/// assets:
///   static_dir: "./public"
///
/// security:
///   cors_allowed_origins: "https://console.example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///
/// logging:
///   log_upstream_events: true
///   show_timing_math: false
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub prompts: Option<PromptsYaml>,
    pub ingest: Option<IngestYaml>,
    pub assets: Option<AssetsYaml>,
    pub security: Option<SecurityYaml>,
    pub logging: Option<LoggingYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsYaml {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f32>,
    pub connect_timeout_seconds: Option<u64>,
    pub configure_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PromptsYaml {
    pub store_url: Option<String>,
    pub store_token: Option<String>,
    pub store_file: Option<PathBuf>,
    pub fetch_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IngestYaml {
    pub forward_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AssetsYaml {
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingYaml {
    pub log_upstream_events: Option<bool>,
    pub show_timing_math: Option<bool>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
