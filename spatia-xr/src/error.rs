//! Error types for the spatial session core

use thiserror::Error;

use crate::host::{Feature, SessionMode};

/// Errors reported by the host spatial-computing API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Host rejected request: {0}")]
    Rejected(String),

    #[error("Host feature not supported: {0}")]
    NotSupported(String),

    #[error("Host session already ended")]
    SessionEnded,

    #[error("Host API error: {0}")]
    Api(String),
}

/// Errors surfaced by the coordinator and its components.
///
/// Cloneable so a single negotiation result can be handed to every caller
/// awaiting the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XrError {
    #[error("Spatial API unavailable: {0}")]
    Capability(String),

    #[error("Session mode not supported: {0}")]
    UnsupportedMode(SessionMode),

    #[error("Session request failed: {0}")]
    SessionRequest(String),

    #[error("Session request cancelled before it became active")]
    SessionCancelled,

    #[error("Feature unavailable: {0}")]
    FeatureUnavailable(Feature),

    #[error("No active session")]
    NoActiveSession,

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl XrError {
    /// Whether this error ends the whole session rather than a single feature.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            XrError::Capability(_)
                | XrError::UnsupportedMode(_)
                | XrError::SessionRequest(_)
                | XrError::SessionCancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, XrError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
