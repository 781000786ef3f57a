// Error taxonomy shared by the dispatch and handling paths.
use std::fmt;

/// Stable error identifiers used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Failure attributable to the transport or the client plumbing.
    CommandDispatchError,
    /// The local handler failed with a non-concurrency error.
    CommandExecutionError,
    /// Optimistic-concurrency failure reported by the local model.
    ConcurrencyException,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CommandDispatchError => "COMMAND_DISPATCH_ERROR",
            ErrorCode::CommandExecutionError => "COMMAND_EXECUTION_ERROR",
            ErrorCode::ConcurrencyException => "CONCURRENCY_EXCEPTION",
        }
    }

    /// Wrap a cause into a remote-style error carrying this code, attributed
    /// to `location` (the reporting client id).
    pub fn convert(&self, location: &str, cause: &dyn fmt::Display) -> CommandError {
        CommandError::Remote {
            code: self.as_str().to_string(),
            message: cause.to_string(),
            location: location.to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure attached to an exceptional command result.
#[derive(thiserror::Error, Debug, Clone)]
pub enum CommandError {
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    #[error("command execution failed: {0}")]
    Execution(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("[{code}] {message}")]
    Remote {
        code: String,
        message: String,
        location: String,
    },
}

impl CommandError {
    /// Wire error code carried by remote-style errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            CommandError::Remote { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Classify a handler failure for the outbound error response.
    pub(crate) fn handler_error_code(&self) -> ErrorCode {
        match self {
            CommandError::Concurrency(_) => ErrorCode::ConcurrencyException,
            _ => ErrorCode::CommandExecutionError,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("command_threads must be positive")]
    NoWorkers,
    #[error("{0} must be a positive integer")]
    NonPositivePermits(&'static str),
    #[error("new_permits_threshold {threshold} exceeds initial_permits {initial}")]
    ThresholdTooHigh { threshold: u64, initial: u64 },
    #[error("read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}
