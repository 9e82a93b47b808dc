use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub bot_token: String,
    #[serde(default)]
    pub use_privileged_intents: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub filename: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_sweep_interval_hours")]
    pub sweep_interval_hours: u64,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_hours: default_sweep_interval_hours(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_session_sweep_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_session_sweep_secs(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_file(&config_path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.bot_token.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "auth.bot_token cannot be empty".to_string(),
            ));
        }

        if self.database.filename.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database.filename cannot be empty".to_string(),
            ));
        }

        if self.retention.sweep_interval_hours == 0 {
            return Err(ConfigError::InvalidConfig(
                "retention.sweep_interval_hours must be at least 1".to_string(),
            ));
        }

        if self.sessions.ttl_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "sessions.ttl_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("FAC_REVIEW_BOT_TOKEN") {
            self.auth.bot_token = value;
        }
        if let Ok(value) = std::env::var("FAC_REVIEW_DATABASE_FILENAME") {
            self.database.filename = value;
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_sweep_interval_hours() -> u64 {
    6
}

fn default_max_age_days() -> u64 {
    30
}

fn default_session_ttl_secs() -> u64 {
    180
}

fn default_session_sweep_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::Config;

    fn parse(yaml: &str) -> Config {
        let mut config: Config = serde_yaml::from_str(yaml).expect("parse config");
        config.validate().expect("valid config");
        config
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse(
            r#"
auth:
  bot_token: "token"
database:
  filename: "bot.db"
"#,
        );

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.retention.sweep_interval_hours, 6);
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(config.sessions.ttl_secs, 180);
        assert_eq!(config.sessions.sweep_interval_secs, 60);
    }

    #[test]
    fn empty_bot_token_is_rejected() {
        let config: Config = serde_yaml::from_str(
            r#"
auth:
  bot_token: ""
database:
  filename: "bot.db"
"#,
        )
        .expect("parse config");

        assert!(config.validate().is_err());
    }

    #[test]
    fn retention_overrides_are_honored() {
        let config = parse(
            r#"
auth:
  bot_token: "token"
database:
  filename: "bot.db"
retention:
  sweep_interval_hours: 12
  max_age_days: 7
"#,
        );

        assert_eq!(config.retention.sweep_interval_hours, 12);
        assert_eq!(config.retention.max_age_days, 7);
    }
}
