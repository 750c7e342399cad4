//! Error types for the parking E2E harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("CSRF token not found on {url}")]
    MissingToken { url: String },

    #[error("Request to {from} was redirected to {to}")]
    Redirected { from: String, to: String },

    #[error("Suite fixture not ready: {0}")]
    FixtureNotReady(String),

    #[error("Unexpected status {status} from {method} {url}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Login failed for '{username}': {reason}")]
    LoginFailed { username: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("No active parking session for plate {plate} in slot {slot}")]
    SessionNotFound { plate: String, slot: String },

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Infrastructure failures abort a scenario before any business check ran.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(
            self,
            E2eError::AssertionFailed(_) | E2eError::SessionNotFound { .. }
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
