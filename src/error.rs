//! Error model for the orchestration core.
//! Resolution failures, strategy failures and transport failures are kept apart so the
//! orchestrator can fail closed on the first and abort on the second.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Configuration resolution failures. Logged by the registry and treated as
/// "no authenticator available".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no authenticator registered under '{0}'")]
    UnknownAuthenticator(String),
    #[error("no principal-store factory registered under '{0}'")]
    UnknownStoreFactory(String),
    #[error("the scope '{0}' does not exist")]
    MissingScope(String),
    #[error("the scope '{0}' does not allow to be used as a delegate")]
    NotADelegate(String),
    #[error("the owning container has been dropped")]
    ContainerGone,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("{code}: {message}")]
    Strategy { code: String, message: String },
    #[error("authenticator panicked: {0}")]
    Panicked(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("no saved request to redirect to")]
    NoSavedRequest,
    #[error("attribute encoding failed: {0}")]
    Encoding(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

impl AuthError {
    pub fn strategy(code: impl Into<String>, msg: impl Into<String>) -> Self {
        AuthError::Strategy { code: code.into(), message: msg.into() }
    }

    pub fn code_str(&self) -> &str {
        match self {
            AuthError::Registry(_) => "registry_error",
            AuthError::Strategy { code, .. } => code.as_str(),
            AuthError::Panicked(_) => "panicked",
            AuthError::MalformedRequest(_) => "malformed_request",
            AuthError::NoSavedRequest => "no_saved_request",
            AuthError::Encoding(_) => "encoding_error",
            AuthError::Transport(_) => "transport_error",
            AuthError::Entropy(_) => "entropy_unavailable",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::MalformedRequest(_) => 400,
            AuthError::Transport(_) | AuthError::Entropy(_) => 503,
            AuthError::Registry(_)
            | AuthError::Strategy { .. }
            | AuthError::Panicked(_)
            | AuthError::NoSavedRequest
            | AuthError::Encoding(_) => 500,
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Encoding(err.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Status carried by a rejected orchestration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusHint {
    Unauthorized,
    Forbidden,
}

impl StatusHint {
    pub fn code(&self) -> u16 {
        match self {
            StatusHint::Unauthorized => 401,
            StatusHint::Forbidden => 403,
        }
    }
}

impl Display for StatusHint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusHint::Unauthorized => write!(f, "unauthorized"),
            StatusHint::Forbidden => write!(f, "forbidden"),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
