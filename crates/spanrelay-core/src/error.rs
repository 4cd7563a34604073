//! Error types for the spanrelay core library.

use thiserror::Error;

/// Result type alias for spanrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for spanrelay.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blank correlation key passed to a fetch
    #[error("correlation key is empty")]
    EmptyCorrelationKey,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let err = Error::EmptyCorrelationKey;
        assert_eq!(err.to_string(), "correlation key is empty");
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let parse_err = toml::from_str::<toml::Value>("not [valid").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Config(_)));
    }
}
