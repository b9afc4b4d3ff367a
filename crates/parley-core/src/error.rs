//! Error types for configuration and settings handling.

use thiserror::Error;

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading configuration or reading/writing settings
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing settings: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Settings file could not be parsed: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("Settings could not be serialized: {0}")]
    SettingsSerialize(#[from] toml::ser::Error),

    #[error("History encoding error: {0}")]
    History(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
