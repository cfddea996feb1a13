//! Error types for a3s-lsp

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the LSP bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// File extension maps to no configured language
    #[error("Unsupported file '{file}': no language server handles it (supported languages: {supported})")]
    UnsupportedTarget { file: String, supported: String },

    /// Action not declared for the detected language
    #[error("Action '{action}' is not supported for {language} (supported actions: {supported})")]
    CapabilityGap {
        action: String,
        language: String,
        supported: String,
    },

    /// Missing installer, failed install, or spawn failure
    #[error("Failed to start {language} language server: {reason}. Install it manually with: {install_hint}")]
    Install {
        language: String,
        reason: String,
        install_hint: String,
    },

    /// Malformed frame or undecodable message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Broken pipe, closed stream, or language server exit
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the deadline
    #[error("Request '{method}' timed out after {}s", timeout.as_secs_f64())]
    Timeout { method: String, timeout: Duration },

    /// JSON-RPC error object returned by the server
    #[error("Language server returned error {code} for '{method}': {message}")]
    Server {
        method: String,
        code: i64,
        message: String,
    },

    /// Edit target escapes the workspace root
    #[error("Path '{path}' is outside the workspace root '{root}'")]
    PathPolicy { path: String, root: String },

    /// File changed on disk while an edit was being applied
    #[error("Edit conflict: {0}")]
    Conflict(String),

    /// Edit that cannot be applied as described
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    /// Inbound action call missing or carrying invalid parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    /// Whether the failure means the session can no longer be used.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_))
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = BridgeError::Timeout {
            method: "textDocument/hover".to_string(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "Request 'textDocument/hover' timed out after 1.5s"
        );
    }

    #[test]
    fn test_install_message_names_manual_command() {
        let err = BridgeError::Install {
            language: "go".to_string(),
            reason: "installer 'go' not found".to_string(),
            install_hint: "go install golang.org/x/tools/gopls@latest".to_string(),
        };
        assert!(err
            .to_string()
            .contains("go install golang.org/x/tools/gopls@latest"));
    }

    #[test]
    fn test_is_transport() {
        assert!(BridgeError::Transport("closed".into()).is_transport());
        assert!(BridgeError::Protocol("bad frame".into()).is_transport());
        assert!(!BridgeError::Server {
            method: "x".into(),
            code: -32601,
            message: "nope".into()
        }
        .is_transport());
    }
}
