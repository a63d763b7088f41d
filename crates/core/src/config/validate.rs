use super::{
    types::{AuthMethod, Config},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde) and api_key auth has keys
/// - Server port is not 0
/// - Allocator limits, capacities and thresholds are sane
/// - Measurement backend has a URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if matches!(config.auth.method, AuthMethod::ApiKey) {
        if config.auth.api_keys.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.api_keys must contain at least one key when method = \"api_key\""
                    .to_string(),
            ));
        }
        if config.auth.api_keys.iter().any(|k| k.key.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "auth.api_keys entries cannot have an empty key".to_string(),
            ));
        }
    }

    config
        .allocator
        .validate()
        .map_err(ConfigError::ValidationError)?;

    if let Some(ref measurement) = config.measurement {
        if measurement.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "measurement.url cannot be empty".to_string(),
            ));
        }
    }

    if config.uploads.max_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "uploads.max_bytes cannot be 0".to_string(),
        ));
    }

    Ok(())
}
