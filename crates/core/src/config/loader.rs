use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment overrides. Nested keys use `__`, so
/// `PARCELHUB_ALLOCATOR__FULL_THRESHOLD_PERCENT=85` sets
/// `allocator.full_threshold_percent`.
pub const ENV_PREFIX: &str = "PARCELHUB_";

/// Variables under [`ENV_PREFIX`] that are not configuration keys.
const NON_CONFIG_VARS: &[&str] = &["config"];

/// Load the TOML file at `path`, then apply `PARCELHUB_*` overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(Figment::from(Toml::file(path)).merge(env_overrides()))
}

/// Parse configuration from a TOML string, without environment overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    extract(Figment::from(Toml::string(toml_str)))
}

/// Like [`load_config_from_str`] but with `PARCELHUB_*` overrides applied.
pub fn load_config_from_str_with_env(toml_str: &str) -> Result<Config, ConfigError> {
    extract(Figment::from(Toml::string(toml_str)).merge(env_overrides()))
}

fn env_overrides() -> Env {
    Env::prefixed(ENV_PREFIX)
        .split("__")
        .ignore(NON_CONFIG_VARS)
}

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[auth]
method = "none"

[server]
port = 9000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_load_config_from_str_missing_auth() {
        let toml = r#"
[server]
port = 8080
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 3000

[allocator]
medium_capacity = 2.5
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.allocator.medium_capacity, 2.5);
    }

    #[test]
    fn test_env_overrides_allocator_and_ignores_config_path() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PARCELHUB_CONFIG", "/etc/parcelhub/config.toml");
            jail.set_env("PARCELHUB_ALLOCATOR__FULL_THRESHOLD_PERCENT", "85");
            jail.set_env("PARCELHUB_SERVER__PORT", "9100");

            let config = load_config_from_str_with_env(
                r#"
[auth]
method = "none"
"#,
            )
            .map_err(|e| e.to_string())?;
            assert_eq!(config.allocator.full_threshold_percent, 85.0);
            assert_eq!(config.server.port, 9100);

            // Without the env layer the defaults stand
            let plain = load_config_from_str("[auth]\nmethod = \"none\"\n")
                .map_err(|e| e.to_string())?;
            assert_eq!(plain.allocator.full_threshold_percent, 90.0);
            Ok(())
        });
    }
}
