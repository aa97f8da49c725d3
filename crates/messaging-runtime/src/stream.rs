//! Continuous pull loop behind [`MessageReceiver::receive_stream`].
//!
//! The stream asks the receiver for up to `batch_size` messages at a time,
//! buffers them and yields them in delivery order. When the buffer is empty
//! it polls again. A failed poll is yielded as an `Err` item and the loop
//! pauses for `error_backoff` before retrying; cancellation ends the stream.
//!
//! Messages still buffered when the stream is cancelled or dropped are not
//! settled; their locks lapse and the broker redelivers them.

use crate::cancel::{cancelled, CancellationSignal};
use crate::config::StreamConfig;
use crate::error::MessagingError;
use crate::lifecycle::ReceivedMessage;
use crate::message::ReceiveOptions;
use crate::receiver::MessageReceiver;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Options for a receive stream
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Messages requested per underlying receive; zero is treated as one.
    ///
    /// Every message in a batch is locked as soon as it is fetched, and its
    /// lock keeps running while it waits in the buffer. A consumer that
    /// spends longer than the broker's lock duration on the earlier messages
    /// gets later handles whose locks have already lapsed. Use a batch size
    /// of 1 for slow consumers, or check
    /// [`ReceivedMessage::lock_remaining`] before processing.
    pub batch_size: usize,
    /// Wait for the first message of each underlying receive
    pub poll_wait: Duration,
    /// Pause after a failed receive
    pub error_backoff: Duration,
    /// Ends the stream when fired; absent means the stream never ends
    pub cancel: Option<CancellationSignal>,
}

impl StreamOptions {
    /// Create new stream options with defaults
    pub fn new() -> Self {
        Self::from_config(&StreamConfig::default())
    }

    /// Stream options seeded from configuration
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            poll_wait: config.poll_wait(),
            error_backoff: config.error_backoff(),
            cancel: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    /// Attach the signal that ends the stream
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct StreamState<'a, R: ?Sized> {
    receiver: &'a R,
    options: StreamOptions,
    buffered: VecDeque<ReceivedMessage>,
    back_off: bool,
}

impl<R: ?Sized> StreamState<'_, R> {
    fn is_cancelled(&self) -> bool {
        self.options
            .cancel
            .as_ref()
            .is_some_and(CancellationSignal::is_cancelled)
    }
}

/// Build the receive stream for any receiver
pub fn receive_stream<'a, R>(
    receiver: &'a R,
    options: StreamOptions,
) -> BoxStream<'a, Result<ReceivedMessage, MessagingError>>
where
    R: MessageReceiver + ?Sized,
{
    let state = StreamState {
        receiver,
        options,
        buffered: VecDeque::new(),
        back_off: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.is_cancelled() {
                return None;
            }

            if let Some(message) = state.buffered.pop_front() {
                return Some((Ok(message), state));
            }

            if state.back_off {
                state.back_off = false;
                tokio::select! {
                    biased;
                    _ = cancelled(state.options.cancel.as_ref()) => return None,
                    _ = tokio::time::sleep(state.options.error_backoff) => {}
                }
            }

            let receive = ReceiveOptions {
                max_wait: Some(state.options.poll_wait),
                cancel: state.options.cancel.clone(),
            };
            let batch_size = state.options.batch_size.max(1);

            match state.receiver.receive_many(batch_size, &receive).await {
                Ok(batch) => {
                    if !batch.is_empty() {
                        debug!(
                            origin = %state.receiver.origin(),
                            count = batch.len(),
                            "Stream buffered messages"
                        );
                    }
                    state.buffered.extend(batch);
                }
                Err(MessagingError::Cancelled) => return None,
                Err(err) => {
                    warn!(
                        origin = %state.receiver.origin(),
                        error = %err,
                        backoff_ms = state.options.error_backoff.as_millis() as u64,
                        "Stream receive failed; backing off"
                    );
                    state.back_off = true;
                    return Some((Err(err), state));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
