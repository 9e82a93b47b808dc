pub use self::parser::{
    AuthConfig, Config, DatabaseConfig, LoggingConfig, RetentionConfig, SessionConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
