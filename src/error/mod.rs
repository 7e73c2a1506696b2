//! Error types for modelbridge.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all modelbridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[cfg(feature = "openai-compatible")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("tool loop did not converge within {max_rounds} rounds")]
    LoopExhausted { max_rounds: usize },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("No tool provider owns '{0}'")]
    ToolNotFound(String),

    #[error("Tool observer error: {0}")]
    Observer(String),

    #[error("Background task panicked: {0}")]
    TaskPanicked(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Operation canceled")]
    Canceled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Not yet available: {0}")]
    NotYetAvailable(String),

    #[error("Response not found: {0}")]
    ResponseNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl BridgeError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            #[cfg(feature = "openai-compatible")]
            Self::Network(_) => ErrorCategory::Network,
            Self::Stream(_) => ErrorCategory::Network,
            Self::Timeout(_) | Self::DeadlineExceeded => ErrorCategory::Timeout,
            Self::Configuration(_) | Self::ConfigParse(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::LoopExhausted { .. } => ErrorCategory::LoopExhausted,
            Self::ToolExecution { .. } | Self::ToolNotFound(_) => ErrorCategory::ToolExecution,
            Self::Observer(_) => ErrorCategory::Observer,
            Self::TaskPanicked(_) => ErrorCategory::TaskFault,
            Self::Canceled => ErrorCategory::Canceled,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Stable snake_case code reported in failed response objects.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::ConfigParse(_) => "configuration_error",
            Self::Api { .. } => "api_error",
            #[cfg(feature = "openai-compatible")]
            Self::Network(_) => "network_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::RateLimited { .. } => "rate_limit_exceeded",
            Self::Stream(_) => "stream_error",
            Self::LoopExhausted { .. } => "tool_loop_exhausted",
            Self::ToolExecution { .. } => "tool_execution_error",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::Observer(_) => "observer_error",
            Self::TaskPanicked(_) => "server_error",
            Self::Timeout(_) => "timeout",
            Self::Canceled => "canceled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::NotYetAvailable(_) => "incomplete_response",
            Self::ResponseNotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_request",
            Self::InvalidState(_) => "invalid_state",
        }
    }

    /// Whether a caller could reasonably retry the operation.
    ///
    /// Informational only: nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Authentication => RecoverySuggestion::CheckCredentials,
            ErrorCategory::RateLimit => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Network => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Server => RecoverySuggestion::RetryWithBackoff,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::LoopExhausted => RecoverySuggestion::RaiseRoundLimit,
            _ => RecoverySuggestion::ContactSupport,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
