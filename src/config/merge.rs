use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig, env};

/// Load the environment configuration and apply YAML overrides on top.
pub(crate) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::load_from_env()?;
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml);
    }
    Ok(config)
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            config.tls = Some(TlsConfig {
                cert_path: tls.cert_path,
                key_path: tls.key_path,
            });
        }
    }

    if let Some(openai) = yaml.openai {
        if openai.api_key.is_some() {
            config.openai_api_key = openai.api_key;
        }
        if let Some(model) = openai.model {
            config.realtime_model = model;
        }
        if let Some(voice) = openai.voice {
            config.realtime_voice = voice;
        }
        if let Some(temperature) = openai.temperature {
            config.realtime_temperature = temperature;
        }
        if let Some(seconds) = openai.connect_timeout_seconds {
            config.upstream_connect_timeout_seconds = seconds;
        }
        if let Some(delay) = openai.configure_delay_ms {
            config.session_configure_delay_ms = delay;
        }
    }

    if let Some(prompts) = yaml.prompts {
        if prompts.store_url.is_some() {
            config.prompt_store_url = prompts.store_url;
        }
        if prompts.store_token.is_some() {
            config.prompt_store_token = prompts.store_token;
        }
        if prompts.store_file.is_some() {
            config.prompt_store_file = prompts.store_file;
        }
        if let Some(seconds) = prompts.fetch_timeout_seconds {
            config.prompt_fetch_timeout_seconds = seconds;
        }
    }

    if let Some(ingest) = yaml.ingest
        && ingest.forward_url.is_some()
    {
        config.ingest_forward_url = ingest.forward_url;
    }

    if let Some(assets) = yaml.assets
        && assets.static_dir.is_some()
    {
        config.static_dir = assets.static_dir;
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
    }

    if let Some(logging) = yaml.logging {
        if let Some(enabled) = logging.log_upstream_events {
            config.log_upstream_events = enabled;
        }
        if let Some(enabled) = logging.show_timing_math {
            config.show_timing_math = enabled;
        }
    }
}
