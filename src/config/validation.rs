use super::ServerConfig;
use crate::core::realtime::openai::TEMPERATURE_RANGE;

pub(crate) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_openai_key(&config.openai_api_key)?;
    validate_temperature(config.realtime_temperature)?;
    validate_timeouts(
        config.prompt_fetch_timeout_seconds,
        config.upstream_connect_timeout_seconds,
    )?;
    validate_rate_limits(
        config.rate_limit_requests_per_second,
        config.rate_limit_burst_size,
    )?;
    Ok(())
}

pub(crate) fn validate_openai_key(key: &Option<String>) -> Result<(), String> {
    match key {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => Err("Missing OpenAI API key: set OPENAI_API_KEY or openai.api_key".to_string()),
    }
}

pub(crate) fn validate_temperature(temperature: f32) -> Result<(), String> {
    if TEMPERATURE_RANGE.contains(&temperature) {
        Ok(())
    } else {
        Err(format!(
            "Realtime temperature {temperature} is outside {}..={}",
            TEMPERATURE_RANGE.start(),
            TEMPERATURE_RANGE.end()
        ))
    }
}

pub(crate) fn validate_timeouts(prompt_fetch_seconds: u64, connect_seconds: u64) -> Result<(), String> {
    if prompt_fetch_seconds == 0 {
        return Err("PROMPT_FETCH_TIMEOUT_SECONDS must be greater than zero".to_string());
    }
    if connect_seconds == 0 {
        return Err("UPSTREAM_CONNECT_TIMEOUT_SECONDS must be greater than zero".to_string());
    }
    Ok(())
}

pub(crate) fn validate_rate_limits(requests_per_second: u32, burst: u32) -> Result<(), String> {
    if requests_per_second == 0 || burst == 0 {
        return Err("Rate limit values must be greater than zero".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_key() {
        assert!(validate_openai_key(&Some("sk-1".to_string())).is_ok());
        assert!(validate_openai_key(&Some("  ".to_string())).is_err());
        assert!(validate_openai_key(&None).is_err());
    }

    #[test]
    fn test_temperature_range() {
        assert!(validate_temperature(0.8).is_ok());
        assert!(validate_temperature(0.6).is_ok());
        assert!(validate_temperature(1.5).is_err());
    }

    #[test]
    fn test_timeouts() {
        assert!(validate_timeouts(10, 10).is_ok());
        assert!(validate_timeouts(0, 10).is_err());
        assert!(validate_timeouts(10, 0).is_err());
    }

    #[test]
    fn test_rate_limits() {
        assert!(validate_rate_limits(60, 10).is_ok());
        assert!(validate_rate_limits(0, 10).is_err());
    }
}
