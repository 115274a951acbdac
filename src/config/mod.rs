//! Configuration module for the call relay server
//!
//! Configuration comes from environment variables (with `.env` loaded at
//! startup) and optionally a YAML file. Priority: YAML > ENV vars > .env
//! values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use call_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::from_env()?;
//!
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::bridge::{BridgeSettings, DEFAULT_GREETING_TEMPLATE};
use crate::core::realtime::RealtimeConfig;
use crate::core::realtime::openai::OpenAIRealtimeVoice;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Everything needed to run the relay:
/// - Server settings (host, port, TLS)
/// - OpenAI Realtime credentials and session defaults
/// - Prompt store location and fetch timeout
/// - Optional ingest forwarding and static assets
/// - Security settings (CORS, rate limiting)
/// - Diagnostic logging switches
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,

    // OpenAI Realtime
    pub openai_api_key: Option<String>,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub realtime_temperature: f32,
    pub upstream_connect_timeout_seconds: u64,
    /// Pause after the upstream opens before the session is configured
    pub session_configure_delay_ms: u64,

    // Prompt store
    pub prompt_store_url: Option<String>,
    pub prompt_store_token: Option<String>,
    pub prompt_store_file: Option<PathBuf>,
    pub prompt_fetch_timeout_seconds: u64,

    // Auxiliary HTTP surface
    pub ingest_forward_url: Option<String>,
    pub static_dir: Option<PathBuf>,

    // Security configuration
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,

    // Diagnostics
    pub log_upstream_events: bool,
    pub show_timing_math: bool,
}

impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut token) = self.prompt_store_token {
            token.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file layered over the environment.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env has already been loaded into the process environment by main.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn prompt_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_fetch_timeout_seconds)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_seconds)
    }

    pub fn session_configure_delay(&self) -> Duration {
        Duration::from_millis(self.session_configure_delay_ms)
    }

    /// Connection settings for the upstream realtime service.
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            model: self.realtime_model.clone(),
            connect_timeout: self.upstream_connect_timeout(),
        }
    }

    /// Per-call session settings.
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            voice: OpenAIRealtimeVoice::from_str_or_default(&self.realtime_voice),
            temperature: self.realtime_temperature,
            greeting_template: DEFAULT_GREETING_TEMPLATE.to_string(),
            log_upstream_events: self.log_upstream_events,
            show_timing_math: self.show_timing_math,
        }
    }
}
