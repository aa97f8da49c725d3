//! Common test utilities for messaging-runtime integration tests
//!
//! This module provides:
//! - One-time tracing initialisation routed through the test writer
//! - Broker fixtures tuned for fast lock expiry
//! - Helpers for publishing and draining queues

use messaging_runtime::{
    BaseMessage, CallOptions, InMemoryBroker, InMemoryConfig, MessageReceiver, MessageSender,
    MessagingError, OutboundMessage, ReceiveOptions, ReceivedMessage,
};
use std::sync::Once;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a tracing subscriber honouring `RUST_LOG`, once per test binary
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("messaging_runtime=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Broker Fixtures
// ============================================================================

/// Broker with short locks so expiry paths run within a test
#[allow(dead_code)]
pub fn fast_broker() -> InMemoryBroker {
    init_tracing();
    InMemoryBroker::new(fast_config())
}

#[allow(dead_code)]
pub fn fast_config() -> InMemoryConfig {
    InMemoryConfig::default()
        .with_lock_duration(Duration::from_millis(250))
        .with_idle_recheck_interval(Duration::from_millis(5))
}

#[allow(dead_code)]
pub fn wait(ms: u64) -> ReceiveOptions {
    ReceiveOptions::new().with_max_wait(Duration::from_millis(ms))
}

// ============================================================================
// Publish and Drain Helpers
// ============================================================================

/// Publish each body as its own text message
#[allow(dead_code)]
pub async fn publish_texts(
    sender: &dyn MessageSender,
    bodies: &[&str],
) -> Result<(), MessagingError> {
    for body in bodies {
        sender
            .publish_one(OutboundMessage::from_text(*body), &CallOptions::new())
            .await?;
    }
    Ok(())
}

/// Receive and complete everything currently available, returning the bodies
#[allow(dead_code)]
pub async fn drain(receiver: &dyn MessageReceiver) -> Result<Vec<String>, MessagingError> {
    let mut bodies = Vec::new();
    loop {
        let batch: Vec<ReceivedMessage> = receiver
            .receive_many(10, &ReceiveOptions::immediate())
            .await?;
        if batch.is_empty() {
            debug!(origin = %receiver.origin(), count = bodies.len(), "Drained origin");
            return Ok(bodies);
        }
        for message in batch {
            bodies.push(message.content_string().to_string());
            message.complete(&CallOptions::new()).await?;
        }
    }
}
