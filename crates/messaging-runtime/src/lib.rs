//! # Messaging Runtime
//!
//! Provider-agnostic message broker runtime: one send/receive contract that
//! every broker adapter fulfils with its native protocol.
//!
//! This library provides:
//! - An immutable outbound message model with JSON construction helpers
//! - Queue and topic senders with batch property merging
//! - Queue, subscription and dead-letter receivers with peek, single, batch
//!   and streaming receive
//! - A lifecycle state machine for received messages (complete, abandon,
//!   defer, dead-letter, lock renewal)
//! - Cooperative cancellation for every operation
//! - An in-memory reference broker
//!
//! ## Module Organization
//!
//! - [error] - Error types for all messaging operations
//! - [message] - Message model, identifiers and call options
//! - [merge] - Property merging for batch publish
//! - [cancel] - Cancellation signals
//! - [sender] - Publishing contract
//! - [receiver] - Receiving contract
//! - [stream] - Continuous receive loop
//! - [lifecycle] - Received message state machine
//! - [client] - Handle factory and native client escape hatch
//! - [config] - Provider kinds and layered configuration
//! - [providers] - Concrete broker adapters
//!
//! ## Example
//!
//! ```no_run
//! use messaging_runtime::{
//!     CallOptions, InMemoryBroker, MessageReceiver, MessageSender, MessagingClient,
//!     OutboundMessage, ReceiveOptions,
//! };
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), messaging_runtime::MessagingError> {
//! let broker = InMemoryBroker::default();
//! let orders = broker.use_queue("orders")?;
//!
//! orders
//!     .publish_one(OutboundMessage::from_text("order #1"), &CallOptions::new())
//!     .await?;
//!
//! let options = ReceiveOptions::new().with_max_wait(Duration::from_secs(1));
//! if let Some(message) = orders.receive_one(&options).await? {
//!     message.complete(&CallOptions::new()).await?;
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod merge;
pub mod message;
pub mod providers;
pub mod receiver;
pub mod sender;
pub mod stream;

// Re-export commonly used types at crate root for convenience
pub use cancel::{run_cancellable, CancellationSignal, CancellationSource};
pub use client::{MessagingClient, MessagingQueue, NativeClient};
pub use config::{InMemoryConfig, MessagingConfig, ProviderKind, StreamConfig};
pub use error::{
    ConfigurationError, LifecycleError, MessagingError, SerializationError, ValidationError,
};
pub use lifecycle::{Disposition, DispositionKind, LockState, LockToken, ReceivedMessage};
pub use merge::merge_properties;
pub use message::{
    BaseMessage, CallOptions, Content, Destination, EntityName, MessageId, Origin,
    OutboundMessage, PeekedMessage, Properties, PropertyValue, Receivable, ReceivableMessage,
    ReceiveOptions, StandardProperty, Timestamp,
};
pub use providers::{InMemoryBroker, InMemoryReceiver, InMemorySender};
pub use receiver::MessageReceiver;
pub use sender::{publish_text, publish_text_with_properties, MessageSender};
pub use stream::StreamOptions;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
