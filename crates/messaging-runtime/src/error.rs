//! Error types for messaging operations.

use crate::lifecycle::DispositionKind;
use crate::message::{MessageId, Timestamp};
use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for all messaging operations
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport failure: {message}")]
    Transport { message: String },

    /// Raised by network adapters when the broker does not answer within
    /// their call deadline. Bounded receive waits never produce it; they
    /// return an empty result instead.
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Requested native client for provider '{requested}' but the active provider is '{actual}'")]
    UnsupportedCapability { requested: String, actual: String },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl MessagingError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Transport { .. } => true,
            Self::Timeout { .. } => true,
            Self::Lifecycle(_) => false,
            Self::Serialization(_) => false,
            Self::UnsupportedCapability { .. } => false,
            Self::Cancelled => false,
            Self::Configuration(_) => false,
        }
    }

    /// Check if error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport { .. } => Some(Duration::from_secs(5)),
            Self::Timeout { .. } => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// Whether the error reports an operation on a settled or lock-expired message.
    ///
    /// Callers usually treat this as "already handled" rather than a failure.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }

    /// Whether the operation stopped because its cancellation signal fired
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Errors raised by operations on a received message that is no longer locked
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Message {message_id} was already settled ({disposition})")]
    AlreadySettled {
        message_id: MessageId,
        disposition: DispositionKind,
    },

    #[error("Lock on message {message_id} expired at {locked_until}")]
    LockExpired {
        message_id: MessageId,
        locked_until: Timestamp,
    },

    #[error("Lock on message {message_id} is no longer held by this receiver")]
    LockLost { message_id: MessageId },
}

/// Errors during message serialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::Parsing {
            message: err.to_string(),
        }
    }
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Batch size {size} exceeds maximum {max_size}")]
    BatchTooLarge { size: usize, max_size: usize },

    #[error("Operation not permitted on {origin}: {message}")]
    NotPermitted { origin: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
