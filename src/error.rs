use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong inside one agent attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error("ElementNotFound: no element matches {0}")]
    ElementNotFound(String),

    #[error("NotAnInputElement: {0} is not a text-entry control")]
    NotAnInputElement(String),

    #[error("LowConfidencePlan: confidence {confidence:.2} is below {threshold:.2}")]
    LowConfidencePlan { confidence: f64, threshold: f64 },

    #[error("TransportFailure: {0}")]
    Transport(String),

    #[error("AlreadyRunning: the agent is already running a task")]
    AlreadyRunning,

    #[error("NoActiveTarget: {0}")]
    NoActiveTarget(String),

    #[error("Cancelled: the agent was stopped")]
    Cancelled,

    #[error("InvalidPlan: {0}")]
    InvalidPlan(String),

    #[error("Config: {0}")]
    Config(String),
}

/// Serializable tag for [`AgentError`], carried on results so callers can
/// branch on the failure without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ElementNotFound,
    NotAnInputElement,
    LowConfidencePlan,
    TransportFailure,
    AlreadyRunning,
    NoActiveTarget,
    Cancelled,
    InvalidPlan,
    Config,
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::ElementNotFound(_) => ErrorKind::ElementNotFound,
            AgentError::NotAnInputElement(_) => ErrorKind::NotAnInputElement,
            AgentError::LowConfidencePlan { .. } => ErrorKind::LowConfidencePlan,
            AgentError::Transport(_) => ErrorKind::TransportFailure,
            AgentError::AlreadyRunning => ErrorKind::AlreadyRunning,
            AgentError::NoActiveTarget(_) => ErrorKind::NoActiveTarget,
            AgentError::Cancelled => ErrorKind::Cancelled,
            AgentError::InvalidPlan(_) => ErrorKind::InvalidPlan,
            AgentError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Transport(err.to_string())
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_leads_with_kind_name() {
        let err = AgentError::LowConfidencePlan {
            confidence: 0.1,
            threshold: 0.3,
        };
        assert!(err.to_string().starts_with("LowConfidencePlan"));
        assert_eq!(err.kind(), ErrorKind::LowConfidencePlan);

        let err = AgentError::transport("connection refused");
        assert_eq!(err.to_string(), "TransportFailure: connection refused");
    }
}
