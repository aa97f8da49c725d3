//! Provider kinds and runtime configuration.
//!
//! Configuration is layered with the `config` crate. Sources, later ones
//! overriding earlier ones:
//!
//! 1. Built-in defaults (every field carries a serde default)
//! 2. An optional YAML, TOML or JSON file, format taken from its extension
//! 3. Environment variables prefixed `MESSAGING__` using `__` as the nesting
//!    separator, e.g. `MESSAGING__IN_MEMORY__LOCK_DURATION_MS=5000`

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "MESSAGING";

/// Longest lock lease the in-memory broker accepts, one day in milliseconds
pub const MAX_LOCK_DURATION_MS: u64 = 86_400_000;

// ============================================================================
// Provider Kind
// ============================================================================

/// Enumeration of supported broker providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AzureServiceBus,
    RabbitMq,
    AwsSqs,
    #[default]
    InMemory,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzureServiceBus => "azure_service_bus",
            Self::RabbitMq => "rabbit_mq",
            Self::AwsSqs => "aws_sqs",
            Self::InMemory => "in_memory",
        }
    }

    /// Get maximum message size for provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AzureServiceBus => 1024 * 1024, // 1MB
            Self::RabbitMq => 128 * 1024 * 1024,  // 128MB
            Self::AwsSqs => 256 * 1024,           // 256KB
            Self::InMemory => 10 * 1024 * 1024,   // 10MB
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level messaging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MessagingConfig {
    /// Active provider
    pub provider: ProviderKind,

    /// In-memory broker settings
    pub in_memory: InMemoryConfig,

    /// Receive stream defaults
    pub stream: StreamConfig,
}

impl MessagingConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Parsing`] when the file is missing or
    /// malformed or a value cannot be coerced, and
    /// [`ConfigurationError::Invalid`] when the result fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading messaging configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let loaded: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration from defaults and the environment only
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::load(None)
    }

    /// Check values that would make the runtime unusable
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.in_memory.validate()?;
        self.stream.validate()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Lock lease granted on receive, in milliseconds
    pub lock_duration_ms: u64,

    /// Deliveries allowed before a message is dead-lettered
    pub max_delivery_count: u32,

    /// Time-to-live for messages published without one, in milliseconds
    pub default_message_ttl_ms: Option<u64>,

    /// Maximum content size in bytes
    pub max_message_size: usize,

    /// Maximum messages per publish or receive batch
    pub max_batch_size: usize,

    /// How often a parked receiver re-checks for expired locks, in milliseconds
    pub idle_recheck_interval_ms: u64,
}

impl InMemoryConfig {
    pub fn lock_duration(&self) -> Duration {
        Duration::from_millis(self.lock_duration_ms)
    }

    pub fn default_message_ttl(&self) -> Option<Duration> {
        self.default_message_ttl_ms.map(Duration::from_millis)
    }

    pub fn idle_recheck_interval(&self) -> Duration {
        Duration::from_millis(self.idle_recheck_interval_ms)
    }

    /// Set the lock lease
    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration_ms = duration_millis(lock_duration);
        self
    }

    pub fn with_max_delivery_count(mut self, max_delivery_count: u32) -> Self {
        self.max_delivery_count = max_delivery_count;
        self
    }

    pub fn with_default_message_ttl(mut self, ttl: Duration) -> Self {
        self.default_message_ttl_ms = Some(duration_millis(ttl));
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_idle_recheck_interval(mut self, interval: Duration) -> Self {
        self.idle_recheck_interval_ms = duration_millis(interval);
        self
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let checks = [
            (self.lock_duration_ms == 0, "in_memory.lock_duration_ms must be positive"),
            (
                self.lock_duration_ms > MAX_LOCK_DURATION_MS,
                "in_memory.lock_duration_ms must not exceed one day",
            ),
            (self.max_delivery_count == 0, "in_memory.max_delivery_count must be positive"),
            (self.max_message_size == 0, "in_memory.max_message_size must be positive"),
            (self.max_batch_size == 0, "in_memory.max_batch_size must be positive"),
            (
                self.idle_recheck_interval_ms == 0,
                "in_memory.idle_recheck_interval_ms must be positive",
            ),
        ];
        reject_first(&checks)
    }
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            lock_duration_ms: 30_000,
            max_delivery_count: 10,
            default_message_ttl_ms: None,
            max_message_size: ProviderKind::InMemory.max_message_size(),
            max_batch_size: 100,
            idle_recheck_interval_ms: 50,
        }
    }
}

/// Defaults for [`crate::stream::StreamOptions`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Messages requested per underlying receive
    pub batch_size: usize,

    /// Wait for the first message of each underlying receive, in milliseconds
    pub poll_wait_ms: u64,

    /// Pause after a failed receive before polling again, in milliseconds
    pub error_backoff_ms: u64,
}

impl StreamConfig {
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        reject_first(&[(self.batch_size == 0, "stream.batch_size must be positive")])
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_wait_ms: 1_000,
            error_backoff_ms: 1_000,
        }
    }
}

fn reject_first(checks: &[(bool, &str)]) -> Result<(), ConfigurationError> {
    match checks.iter().find(|(failed, _)| *failed) {
        Some((_, message)) => Err(ConfigurationError::Invalid {
            message: message.to_string(),
        }),
        None => Ok(()),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
