//! Error Types

use std::fmt;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// One failed attempt to initialize a candidate model
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateFailure {
    /// Model identifier that was tried
    pub model: String,

    /// Why initialization failed
    pub reason: String,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.model, self.reason)
    }
}

/// Every attempt made by a failed model acquisition, in the order tried
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateFailures(pub Vec<CandidateFailure>);

impl fmt::Display for CandidateFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no candidate models were configured");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limited or out of quota
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Malformed provider output
    #[error("Parse error: {0}")]
    Parse(String),

    /// Every candidate model failed to initialize
    #[error("No candidate model could be initialized ({0})")]
    ModelUnavailable(CandidateFailures),

    /// A tool with this name is already registered
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments do not match the declared parameters
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The reasoning loop never produced a final answer
    #[error("Agent step limit ({0}) exceeded without a final answer")]
    StepLimitExceeded(usize),

    /// Required credential is not configured
    #[error("Missing credential: set {0}")]
    MissingCredential(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used to decide how far an error may propagate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ModelUnavailable,
    DuplicateTool,
    ToolNotFound,
    InvalidArguments,
    ProviderRuntimeError,
    AgentStepLimitExceeded,
    Configuration,
    Io,
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Provider(_)
            | Self::ProviderUnavailable(_)
            | Self::RateLimited(_)
            | Self::Auth(_)
            | Self::Parse(_)
            | Self::Json(_) => ErrorKind::ProviderRuntimeError,
            Self::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            Self::DuplicateTool(_) => ErrorKind::DuplicateTool,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::StepLimitExceeded(_) => ErrorKind::AgentStepLimitExceeded,
            Self::MissingCredential(_) | Self::Config(_) => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether a session may continue after a turn failed with this error.
    ///
    /// Startup kinds and failures of the session's own output are fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ProviderRuntimeError
                | ErrorKind::AgentStepLimitExceeded
                | ErrorKind::ToolNotFound
                | ErrorKind::InvalidArguments
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(_) | Self::Parse(_) | Self::Json(_) => {
                "The AI service returned an error. Please try again.".into()
            }
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::RateLimited(_) | Self::Auth(_) => {
                "It looks like your API key might be invalid or out of quota. Please check your account.".into()
            }
            Self::ModelUnavailable(failures) => {
                format!("None of the configured models could be used: {failures}")
            }
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::InvalidArguments { tool, reason } => {
                format!("Invalid input for tool '{tool}': {reason}")
            }
            Self::StepLimitExceeded(_) => {
                "The request took too many steps to answer. Please try a simpler query.".into()
            }
            Self::MissingCredential(var) => format!("No API key configured. Set {var}."),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_unavailable_lists_every_candidate() {
        let err = AgentError::ModelUnavailable(CandidateFailures(vec![
            CandidateFailure { model: "alpha".into(), reason: "not found".into() },
            CandidateFailure { model: "beta".into(), reason: "quota exhausted".into() },
        ]));

        let text = err.to_string();
        assert!(text.contains("alpha: not found"));
        assert!(text.contains("beta: quota exhausted"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_runtime_errors_are_recoverable() {
        assert!(AgentError::Auth("bad key".into()).is_recoverable());
        assert!(AgentError::RateLimited("429".into()).is_recoverable());
        assert!(AgentError::StepLimitExceeded(3).is_recoverable());
        assert!(!AgentError::DuplicateTool("calculator".into()).is_recoverable());
        assert!(!AgentError::Io(std::io::Error::other("closed")).is_recoverable());
    }
}
