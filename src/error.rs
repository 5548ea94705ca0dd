use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoordinationError>;

#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("No eligible agent: {0}")]
    NoEligibleAgent(String),

    #[error("Agent {agent_id} timed out after {timeout:?}")]
    AgentTimeout { agent_id: String, timeout: Duration },

    #[error("Agent {agent_id} unreachable: {reason}")]
    AgentUnreachable { agent_id: String, reason: String },

    #[error("No agent produced a usable response")]
    EmptyResponseSet,

    #[error("User {user_id} may not access client {client_id}")]
    AccessDenied { user_id: String, client_id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    TryFallbackAgent,
    DegradeQuality,
    FailRequest,
    ProceedWithoutContext,
    SurfaceToCaller,
    ReloadConfig,
}

impl CoordinationError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            CoordinationError::NoEligibleAgent(_) => RecoveryStrategy::FailRequest,
            CoordinationError::AgentTimeout { .. } => RecoveryStrategy::TryFallbackAgent,
            CoordinationError::AgentUnreachable { .. } => RecoveryStrategy::TryFallbackAgent,
            CoordinationError::EmptyResponseSet => RecoveryStrategy::FailRequest,
            CoordinationError::AccessDenied { .. } => RecoveryStrategy::ProceedWithoutContext,
            CoordinationError::NotFound(_) => RecoveryStrategy::SurfaceToCaller,
            CoordinationError::ConfigError(_) => RecoveryStrategy::ReloadConfig,
            CoordinationError::StorageError(_) => RecoveryStrategy::ProceedWithoutContext,
            CoordinationError::ParseError(_) => RecoveryStrategy::DegradeQuality,
        }
    }

    /// Stable label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinationError::NoEligibleAgent(_) => "no_eligible_agent",
            CoordinationError::AgentTimeout { .. } => "agent_timeout",
            CoordinationError::AgentUnreachable { .. } => "agent_unreachable",
            CoordinationError::EmptyResponseSet => "empty_response_set",
            CoordinationError::AccessDenied { .. } => "access_denied",
            CoordinationError::NotFound(_) => "not_found",
            CoordinationError::ConfigError(_) => "config_error",
            CoordinationError::StorageError(_) => "storage_error",
            CoordinationError::ParseError(_) => "parse_error",
        }
    }

    /// Whether the failure belongs to a single agent call rather than the whole request.
    pub fn is_per_agent(&self) -> bool {
        matches!(
            self,
            CoordinationError::AgentTimeout { .. } | CoordinationError::AgentUnreachable { .. }
        )
    }
}

// Conversion implementations for common error types
impl From<std::io::Error> for CoordinationError {
    fn from(err: std::io::Error) -> Self {
        CoordinationError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        CoordinationError::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for CoordinationError {
    fn from(err: toml::de::Error) -> Self {
        CoordinationError::ConfigError(err.to_string())
    }
}
