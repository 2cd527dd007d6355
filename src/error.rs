//! Error types.

use thiserror::Error;

/// Errors raised while loading or validating mock definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }

    /// Prefix the message with the location it was raised at.
    pub fn context(self, location: impl AsRef<str>) -> Self {
        match self {
            ConfigError::Invalid(message) => {
                ConfigError::Invalid(format!("{}: {}", location.as_ref(), message))
            }
            other => other,
        }
    }
}

/// Failure of a single expression marker. Never escapes rendering.
#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    #[error("unknown expression '{0}'")]
    UnknownIdentifier(String),

    #[error("malformed expression: {0}")]
    Malformed(String),

    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),

    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("no value extracted")]
    NoValue,
}

impl ExpressionError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ExpressionError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
