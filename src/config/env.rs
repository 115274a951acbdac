use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ServerConfig, TlsConfig};
use crate::core::realtime::openai::{DEFAULT_REALTIME_MODEL, DEFAULT_TEMPERATURE};

pub(crate) const DEFAULT_PORT: u16 = 4000;
pub(crate) const DEFAULT_PROMPT_FETCH_TIMEOUT_SECONDS: u64 = 10;
pub(crate) const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECONDS: u64 = 10;
pub(crate) const DEFAULT_SESSION_CONFIGURE_DELAY_MS: u64 = 100;
pub(crate) const DEFAULT_RATE_LIMIT_REQUESTS_PER_SECOND: u32 = 60;
pub(crate) const DEFAULT_RATE_LIMIT_BURST_SIZE: u32 = 10;

/// Non-empty, trimmed value of an environment variable.
fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, String> {
    match env_opt(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("Invalid value for {name}: '{raw}'")),
        None => Ok(default),
    }
}

fn env_bool(name: &str) -> Result<bool, String> {
    match env_opt(name).as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(format!("Invalid boolean for {name}: '{other}'")),
    }
}

/// Hosted deployments (`RENDER` set) must listen on every interface.
fn default_host() -> String {
    if env::var_os("RENDER").is_some() {
        "0.0.0.0".to_string()
    } else {
        "localhost".to_string()
    }
}

fn tls_from_env() -> Result<Option<TlsConfig>, String> {
    match (env_opt("TLS_CERT_PATH"), env_opt("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err("TLS_CERT_PATH is set but TLS_KEY_PATH is missing".to_string()),
        (None, Some(_)) => Err("TLS_KEY_PATH is set but TLS_CERT_PATH is missing".to_string()),
    }
}

/// Build a configuration from the process environment and defaults.
pub(crate) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    Ok(ServerConfig {
        host: env_opt("HOST").unwrap_or_else(default_host),
        port: env_parse("PORT", DEFAULT_PORT)?,
        tls: tls_from_env()?,

        openai_api_key: env_opt("OPENAI_API_KEY"),
        realtime_model: env_opt("OPENAI_REALTIME_MODEL")
            .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
        realtime_voice: env_opt("OPENAI_REALTIME_VOICE").unwrap_or_else(|| "alloy".to_string()),
        realtime_temperature: env_parse("OPENAI_REALTIME_TEMPERATURE", DEFAULT_TEMPERATURE)?,
        upstream_connect_timeout_seconds: env_parse(
            "UPSTREAM_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECONDS,
        )?,
        session_configure_delay_ms: env_parse(
            "SESSION_CONFIGURE_DELAY_MS",
            DEFAULT_SESSION_CONFIGURE_DELAY_MS,
        )?,

        prompt_store_url: env_opt("PROMPT_STORE_URL"),
        prompt_store_token: env_opt("PROMPT_STORE_TOKEN"),
        prompt_store_file: env_opt("PROMPT_STORE_FILE").map(PathBuf::from),
        prompt_fetch_timeout_seconds: env_parse(
            "PROMPT_FETCH_TIMEOUT_SECONDS",
            DEFAULT_PROMPT_FETCH_TIMEOUT_SECONDS,
        )?,

        ingest_forward_url: env_opt("INGEST_FORWARD_URL"),
        static_dir: env_opt("STATIC_DIR").map(PathBuf::from),

        cors_allowed_origins: env_opt("CORS_ALLOWED_ORIGINS"),
        rate_limit_requests_per_second: env_parse(
            "RATE_LIMIT_REQUESTS_PER_SECOND",
            DEFAULT_RATE_LIMIT_REQUESTS_PER_SECOND,
        )?,
        rate_limit_burst_size: env_parse("RATE_LIMIT_BURST_SIZE", DEFAULT_RATE_LIMIT_BURST_SIZE)?,

        log_upstream_events: env_bool("LOG_UPSTREAM_EVENTS")?,
        show_timing_math: env_bool("SHOW_TIMING_MATH")?,
    })
}
