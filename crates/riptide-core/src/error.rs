//! Error types for the Riptide engine

use thiserror::Error;

/// Result type alias using Riptide Error
pub type Result<T> = std::result::Result<T, Error>;

/// Riptide error types
#[derive(Error, Debug)]
pub enum Error {
    // === Workflow Errors ===
    /// Structural failure of the scanning pipeline, fatal to the whole run.
    #[error("{0}")]
    ScanningWorkflow(String),

    #[error("Scan cancelled: {reason}")]
    ScanCancelled { reason: String },

    // === Plugin Errors ===
    /// Failure raised by, or on behalf of, a single plugin.
    #[error("{message}")]
    PluginExecution {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    // === Remote Plugin Errors ===
    #[error("{message}")]
    LanguageServer {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // === Transport Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    // === Target Errors ===
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Configuration(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a plugin execution error with no underlying cause
    pub fn plugin_execution(message: impl Into<String>) -> Self {
        Error::PluginExecution {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap `cause` in a plugin execution error carrying `message`
    pub fn plugin_execution_caused_by(message: impl Into<String>, cause: Error) -> Self {
        Error::PluginExecution {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Create a language server error with no underlying cause
    pub fn language_server(message: impl Into<String>) -> Self {
        Error::LanguageServer {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap `cause` in a language server error carrying `message`
    pub fn language_server_caused_by<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::LanguageServer {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Whether this error already attributes a failure to a plugin
    pub fn is_plugin_execution(&self) -> bool {
        matches!(self, Error::PluginExecution { .. })
    }

    /// Get an error code for logging
    pub fn code(&self) -> &'static str {
        match self {
            Error::ScanningWorkflow(_) => "SCANNING_WORKFLOW_ERROR",
            Error::ScanCancelled { .. } => "SCAN_CANCELLED",
            Error::PluginExecution { .. } => "PLUGIN_EXECUTION_ERROR",
            Error::LanguageServer { .. } => "LANGUAGE_SERVER_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::InvalidTarget(_) => "INVALID_TARGET",
            Error::Configuration(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_workflow_error_displays_bare_message() {
        let err = Error::ScanningWorkflow("At least one PortScanner plugin is required".into());
        assert_eq!(err.to_string(), "At least one PortScanner plugin is required");
        assert_eq!(err.code(), "SCANNING_WORKFLOW_ERROR");
    }

    #[test]
    fn test_plugin_execution_keeps_cause() {
        let err = Error::plugin_execution_caused_by(
            "Plugin execution error on '/a/VULN_DETECTION/x/1.0'.",
            Error::Internal("boom".into()),
        );
        assert!(err.is_plugin_execution());
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some(String::from("Internal error: boom"))
        );
    }

    #[test]
    fn test_language_server_is_not_plugin_execution() {
        let err = Error::language_server("Language service is not registered.");
        assert!(!err.is_plugin_execution());
        assert_eq!(err.code(), "LANGUAGE_SERVER_ERROR");
    }
}
