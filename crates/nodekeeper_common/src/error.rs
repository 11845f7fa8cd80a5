//! Error types for nodekeeper.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeeperError {
    /// A step needs a context key that was never written.
    #[error("Step '{step}' requires context variable '{key}' which is missing")]
    MissingContextVariable { step: String, key: String },

    #[error("Context variable '{key}' has an unexpected type: {reason}")]
    ContextType { key: String, reason: String },

    #[error("State file error: {0}")]
    StateFile(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Cannot parse version from '{0}'")]
    VersionParse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Action failed: {0}")]
    Action(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KeeperError {
    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        KeeperError::Command {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Network failures are logged and retried, never fatal on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, KeeperError::Http(_) | KeeperError::Rpc(_))
    }

    /// Errors that must stop the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KeeperError::MissingContextVariable { .. } | KeeperError::StateFile(_)
        )
    }
}

pub type KeeperResult<T> = Result<T, KeeperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_names_key() {
        let err = KeeperError::MissingContextVariable {
            step: "install_execution".to_string(),
            key: "network".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'network'"));
        assert!(msg.contains("install_execution"));
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rpc_is_transient() {
        assert!(KeeperError::Rpc("timeout".into()).is_transient());
    }
}
