//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field holds a value that cannot be used.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// Two `[[servers]]` entries share an id.
    #[error("duplicate server id '{0}'")]
    DuplicateServer(String),

    /// `default_target` names a server that is not registered.
    #[error("default_target '{0}' is not a registered server")]
    UnknownDefaultTarget(String),

    /// An environment override could not be parsed.
    #[error("invalid environment override {var}={value}: {reason}")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },

    /// No `[bridge]` command configured and none given on the command line.
    #[error("no bridge command configured; add a [bridge] section or pass one on the command line")]
    MissingBridgeCommand,
}

impl ConfigError {
    /// Create an invalid-field error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
