use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    ApiLoggingSettings, AuthSettings, CacheSettings, DatabaseSettings, LoggingSettings,
    ProgramSettings, ServerSettings, Settings,
};

/// Prefix for environment overrides, e.g. `CLUBHOUSE__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "CLUBHOUSE";

/// Minimum length of the token signing secret.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Loads the application configuration from `config.toml` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Loads the configuration, layering environment variables over the given
/// TOML file. The file is optional; built-in defaults fill any gaps.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("api_logging.exclude_paths")
                .with_list_parse_key("api_logging.exclude_methods"),
        )
        .build()?;

    let mut settings = builder.try_deserialize::<Settings>()?;
    if settings.database.url.is_empty() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            settings.database.url = url;
        }
    }
    if settings.auth.jwt_secret.is_empty() {
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            settings.auth.jwt_secret = secret;
        }
    }

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.auth.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::ValidationError(format!(
                "auth.jwt_secret must be at least {} characters long",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.auth.token_ttl_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.token_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.programs.member_capacity < 1 || self.programs.mentor_capacity < 1 {
            return Err(ConfigError::ValidationError(
                "program capacities must be at least 1".to_string(),
            ));
        }
        if self.api_logging.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "api_logging.channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> Settings {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    fn valid() -> Settings {
        let mut settings = Settings::default();
        settings.auth.jwt_secret = "x".repeat(MIN_JWT_SECRET_LEN);
        settings
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.api_logging.truncate_body_at, 5000);
        assert_eq!(settings.api_logging.exclude_paths, vec!["/health", "/ping"]);
        assert_eq!(settings.api_logging.retention_days, 30);
        assert_eq!(settings.auth.token_ttl_minutes, 60);
        assert_eq!(settings.programs.member_capacity, 30);
        assert_eq!(settings.programs.mentor_capacity, 5);
        assert!(settings.cache.enabled);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let settings = from_toml(
            r#"
            [server]
            port = 9000

            [api_logging]
            log_only_errors = true
            "#,
        );
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert!(settings.api_logging.log_only_errors);
        assert!(settings.api_logging.enabled);
        assert_eq!(settings.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn validation_requires_long_secret() {
        let mut settings = valid();
        assert!(settings.validate().is_ok());
        settings.auth.jwt_secret = "short".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("jwt_secret"));
    }

    #[test]
    fn validation_rejects_zero_capacity() {
        let mut settings = valid();
        settings.programs.mentor_capacity = 0;
        assert!(settings.validate().is_err());
    }
}
