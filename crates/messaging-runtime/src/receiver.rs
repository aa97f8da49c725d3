//! Receiving contract for queues, subscriptions and dead-letter origins.
//!
//! Peeking is non-destructive: it never starts a lock and never changes the
//! delivery count. Receiving hands out [`ReceivedMessage`] handles that hold a
//! lock until settled or expired.
//!
//! Bounded waits follow [`ReceiveOptions::max_wait`]: absent blocks until a
//! message arrives or the call is cancelled, zero returns immediately. A wait
//! that runs out is not an error; it yields `None` or an empty vector.

use crate::error::{MessagingError, ValidationError};
use crate::lifecycle::ReceivedMessage;
use crate::message::{CallOptions, Origin, PeekedMessage, ReceiveOptions};
use crate::stream::StreamOptions;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Interface implemented by every provider's queue or subscription receiver
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Where this receiver pulls from
    fn origin(&self) -> &Origin;

    /// Read the next available message without locking it
    async fn peek_one(&self, options: &CallOptions)
        -> Result<Option<PeekedMessage>, MessagingError>;

    /// Read up to `max` available messages without locking them
    async fn peek_many(
        &self,
        max: usize,
        options: &CallOptions,
    ) -> Result<Vec<PeekedMessage>, MessagingError>;

    /// Receive one message under a lock, waiting per `options.max_wait`
    async fn receive_one(
        &self,
        options: &ReceiveOptions,
    ) -> Result<Option<ReceivedMessage>, MessagingError>;

    /// Receive up to `max` messages under a lock.
    ///
    /// Waits at most `options.max_wait` for the first message, then returns
    /// straight away with whatever else is already available.
    async fn receive_many(
        &self,
        max: usize,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, MessagingError>;

    /// Lazily receive messages forever, re-polling whenever the buffer runs
    /// dry. The stream ends only when `options.cancel` fires.
    fn receive_stream(
        &self,
        options: StreamOptions,
    ) -> BoxStream<'_, Result<ReceivedMessage, MessagingError>> {
        crate::stream::receive_stream(self, options)
    }
}

/// Reject a batch size of zero
pub fn validate_max_messages(max: usize) -> Result<(), ValidationError> {
    if max == 0 {
        return Err(ValidationError::OutOfRange {
            field: "max_messages".to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "receiver_tests.rs"]
mod tests;
