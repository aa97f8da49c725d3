//! Publishing contract for queues and topics.

use crate::error::MessagingError;
use crate::merge::merge_properties;
use crate::message::{CallOptions, Destination, MessageId, OutboundMessage, Properties};
use async_trait::async_trait;

/// Interface implemented by every provider's queue or topic sender
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Where this sender publishes
    fn destination(&self) -> &Destination;

    /// Publish a single message.
    ///
    /// Zero-length content is allowed. When the caller left the id unset the
    /// adapter assigns one and returns it.
    async fn publish_one(
        &self,
        message: OutboundMessage,
        options: &CallOptions,
    ) -> Result<MessageId, MessagingError>;

    /// Publish a batch of messages.
    ///
    /// `common_properties`, when given, is merged into every message's
    /// properties with [`merge_properties`]; the caller's map is never
    /// modified. Ids are returned in input order. An empty batch is a no-op.
    async fn publish_batch(
        &self,
        messages: Vec<OutboundMessage>,
        common_properties: Option<&Properties>,
        options: &CallOptions,
    ) -> Result<Vec<MessageId>, MessagingError>;
}

/// A message paired with the properties that go on the wire
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub message: OutboundMessage,
    pub properties: Properties,
}

impl OutgoingMessage {
    /// Prepare a single publish; properties are taken as-is
    pub fn single(message: OutboundMessage) -> Self {
        let properties = message.properties().clone();
        Self {
            message,
            properties,
        }
    }

    /// Prepare every message of a batch, merging in the common properties
    pub fn batch(messages: Vec<OutboundMessage>, common: Option<&Properties>) -> Vec<Self> {
        messages
            .into_iter()
            .map(|message| {
                let properties = merge_properties(message.properties(), common);
                Self {
                    message,
                    properties,
                }
            })
            .collect()
    }
}

/// Publish `text` as a message with no properties
pub async fn publish_text<S>(
    sender: &S,
    text: impl Into<String>,
    options: &CallOptions,
) -> Result<MessageId, MessagingError>
where
    S: MessageSender + ?Sized,
{
    sender
        .publish_one(OutboundMessage::from_text(text), options)
        .await
}

/// Publish `text` as a message carrying `properties`
pub async fn publish_text_with_properties<S>(
    sender: &S,
    text: impl Into<String>,
    properties: Properties,
    options: &CallOptions,
) -> Result<MessageId, MessagingError>
where
    S: MessageSender + ?Sized,
{
    sender
        .publish_one(OutboundMessage::with_properties(text, properties), options)
        .await
}

#[cfg(test)]
#[path = "sender_tests.rs"]
mod tests;
