//! Handle factory and provider escape hatch.
//!
//! A [`MessagingClient`] is the entry point application code holds. It hands
//! out senders for queues and topics, receivers for queues, subscriptions and
//! dead-letter origins, and composite [`MessagingQueue`] handles. When a
//! caller needs something the common contract does not cover, the
//! [`NativeClient`] escape hatch exposes the provider's own client.

use crate::config::ProviderKind;
use crate::error::MessagingError;
use crate::lifecycle::ReceivedMessage;
use crate::message::{
    CallOptions, Destination, EntityName, MessageId, Origin, OutboundMessage, PeekedMessage,
    Properties, ReceiveOptions,
};
use crate::providers::InMemoryBroker;
use crate::receiver::MessageReceiver;
use crate::sender::MessageSender;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Main interface for obtaining broker handles across all providers
pub trait MessagingClient: Send + Sync {
    /// Provider backing this client
    fn provider_kind(&self) -> ProviderKind;

    /// Sender publishing to `destination`
    fn use_sender(&self, destination: Destination)
        -> Result<Arc<dyn MessageSender>, MessagingError>;

    /// Receiver pulling from `origin`
    fn use_receiver(&self, origin: Origin) -> Result<Arc<dyn MessageReceiver>, MessagingError>;

    /// Expose the provider-native client.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::UnsupportedCapability`] when `requested`
    /// is not the provider backing this client.
    fn native_client(&self, requested: ProviderKind) -> Result<NativeClient, MessagingError>;

    /// Sender and receiver for the same queue
    fn use_queue(&self, name: &str) -> Result<MessagingQueue, MessagingError> {
        Ok(MessagingQueue::new(
            self.use_queue_sender(name)?,
            self.use_queue_receiver(name)?,
        ))
    }

    fn use_queue_sender(&self, name: &str) -> Result<Arc<dyn MessageSender>, MessagingError> {
        self.use_sender(Destination::Queue(EntityName::new(name)?))
    }

    fn use_queue_receiver(&self, name: &str) -> Result<Arc<dyn MessageReceiver>, MessagingError> {
        self.use_receiver(Origin::queue(name)?)
    }

    /// Sender broadcasting to every subscription of a topic
    fn use_topic(&self, name: &str) -> Result<Arc<dyn MessageSender>, MessagingError> {
        self.use_sender(Destination::Topic(EntityName::new(name)?))
    }

    fn use_subscription(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<Arc<dyn MessageReceiver>, MessagingError> {
        self.use_receiver(Origin::subscription(topic, subscription)?)
    }

    /// Receiver for the dead-letter sub-queue of `origin`
    fn use_dead_letter(&self, origin: &Origin) -> Result<Arc<dyn MessageReceiver>, MessagingError> {
        self.use_receiver(origin.dead_letter())
    }
}

/// Fail with [`MessagingError::UnsupportedCapability`] unless the kinds match
pub fn ensure_provider(requested: ProviderKind, actual: ProviderKind) -> Result<(), MessagingError> {
    if requested != actual {
        return Err(MessagingError::UnsupportedCapability {
            requested: requested.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Native Client
// ============================================================================

/// Provider-native client handed out by [`MessagingClient::native_client`]
#[derive(Clone)]
pub enum NativeClient {
    InMemory(InMemoryBroker),
    /// Client of an adapter living outside this crate
    External {
        kind: ProviderKind,
        client: Arc<dyn Any + Send + Sync>,
    },
}

impl NativeClient {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::InMemory(_) => ProviderKind::InMemory,
            Self::External { kind, .. } => *kind,
        }
    }

    /// Narrow to the in-memory broker
    pub fn into_in_memory(self) -> Result<InMemoryBroker, MessagingError> {
        match self {
            Self::InMemory(broker) => Ok(broker),
            Self::External { kind, .. } => Err(MessagingError::UnsupportedCapability {
                requested: ProviderKind::InMemory.to_string(),
                actual: kind.to_string(),
            }),
        }
    }

    /// Narrow to a concrete client type
    pub fn downcast<T>(self) -> Result<Arc<T>, MessagingError>
    where
        T: Any + Send + Sync,
    {
        let kind = self.kind();
        let client: Arc<dyn Any + Send + Sync> = match self {
            Self::InMemory(broker) => Arc::new(broker),
            Self::External { client, .. } => client,
        };

        client
            .downcast::<T>()
            .map_err(|_| MessagingError::UnsupportedCapability {
                requested: std::any::type_name::<T>().to_string(),
                actual: kind.to_string(),
            })
    }
}

impl std::fmt::Debug for NativeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeClient")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Composite Queue Handle
// ============================================================================

/// Sender and receiver bound to the same queue
#[derive(Clone)]
pub struct MessagingQueue {
    sender: Arc<dyn MessageSender>,
    receiver: Arc<dyn MessageReceiver>,
}

impl MessagingQueue {
    pub fn new(sender: Arc<dyn MessageSender>, receiver: Arc<dyn MessageReceiver>) -> Self {
        Self { sender, receiver }
    }

    pub fn sender(&self) -> &Arc<dyn MessageSender> {
        &self.sender
    }

    pub fn receiver(&self) -> &Arc<dyn MessageReceiver> {
        &self.receiver
    }
}

#[async_trait]
impl MessageSender for MessagingQueue {
    fn destination(&self) -> &Destination {
        self.sender.destination()
    }

    async fn publish_one(
        &self,
        message: OutboundMessage,
        options: &CallOptions,
    ) -> Result<MessageId, MessagingError> {
        self.sender.publish_one(message, options).await
    }

    async fn publish_batch(
        &self,
        messages: Vec<OutboundMessage>,
        common_properties: Option<&Properties>,
        options: &CallOptions,
    ) -> Result<Vec<MessageId>, MessagingError> {
        self.sender
            .publish_batch(messages, common_properties, options)
            .await
    }
}

#[async_trait]
impl MessageReceiver for MessagingQueue {
    fn origin(&self) -> &Origin {
        self.receiver.origin()
    }

    async fn peek_one(
        &self,
        options: &CallOptions,
    ) -> Result<Option<PeekedMessage>, MessagingError> {
        self.receiver.peek_one(options).await
    }

    async fn peek_many(
        &self,
        max: usize,
        options: &CallOptions,
    ) -> Result<Vec<PeekedMessage>, MessagingError> {
        self.receiver.peek_many(max, options).await
    }

    async fn receive_one(
        &self,
        options: &ReceiveOptions,
    ) -> Result<Option<ReceivedMessage>, MessagingError> {
        self.receiver.receive_one(options).await
    }

    async fn receive_many(
        &self,
        max: usize,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        self.receiver.receive_many(max, options).await
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
