use thiserror::Error;

/// Top-level error type shared across the PNP crates.
///
/// Subsystem crates define their own error enums and convert into this one
/// at the binary boundary so that `?` works from `main`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PnpError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Condition error: {0}")]
    Condition(String),

    #[error("Action error: {0}")]
    Action(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl From<toml::de::Error> for PnpError {
    fn from(err: toml::de::Error) -> Self {
        PnpError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PnpError {
    fn from(err: toml::ser::Error) -> Self {
        PnpError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PnpError {
    fn from(err: serde_json::Error) -> Self {
        PnpError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for PNP core operations.
pub type Result<T> = std::result::Result<T, PnpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PnpError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = PnpError::Parse("bad command".to_string());
        assert_eq!(err.to_string(), "Parse error: bad command");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PnpError = io_err.into();
        assert!(matches!(err, PnpError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("not = = valid").unwrap_err();
        let err: PnpError = toml_err.into();
        assert!(matches!(err, PnpError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err: PnpError = json_err.into();
        assert!(matches!(err, PnpError::Serialization(_)));
    }

    #[test]
    fn test_shutting_down_display() {
        assert_eq!(PnpError::ShuttingDown.to_string(), "Shutdown in progress");
    }
}
