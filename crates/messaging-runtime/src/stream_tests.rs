//! Tests for the receive stream pull loop.

use super::*;
use crate::cancel::{run_cancellable, CancellationSource};
use crate::lifecycle::{Disposition, LockToken, MessageSettler};
use crate::message::{
    BaseMessage, CallOptions, Content, MessageId, Origin, PeekedMessage, ReceivableMessage,
    Timestamp,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct NoopSettler;

#[async_trait]
impl MessageSettler for NoopSettler {
    async fn settle(&self, _: &LockToken, _: &Disposition) -> Result<(), MessagingError> {
        Ok(())
    }

    async fn renew_lock(&self, _: &LockToken) -> Result<Timestamp, MessagingError> {
        Ok(Timestamp::now().plus(Duration::from_secs(30)))
    }
}

/// Receiver that replays scripted poll results, then waits out each poll
/// with nothing to deliver
struct ScriptedReceiver {
    origin: Origin,
    script: Mutex<VecDeque<Result<Vec<&'static str>, MessagingError>>>,
    polls: AtomicUsize,
    requested: Mutex<Vec<usize>>,
}

impl ScriptedReceiver {
    fn new(script: Vec<Result<Vec<&'static str>, MessagingError>>) -> Self {
        Self {
            origin: Origin::queue("orders").unwrap(),
            script: Mutex::new(script.into()),
            polls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn received(&self, body: &str) -> ReceivedMessage {
        let sequence = self.polls.load(Ordering::SeqCst) as i64;
        let snapshot = ReceivableMessage::new(
            self.origin.clone(),
            MessageId::new(),
            Content::from_text(body),
            Timestamp::now(),
            sequence,
        );
        ReceivedMessage::new(
            snapshot,
            LockToken::new(),
            Timestamp::now().plus(Duration::from_secs(30)),
            Arc::new(NoopSettler),
        )
    }
}

#[async_trait]
impl MessageReceiver for ScriptedReceiver {
    fn origin(&self) -> &Origin {
        &self.origin
    }

    async fn peek_one(&self, _: &CallOptions) -> Result<Option<PeekedMessage>, MessagingError> {
        Ok(None)
    }

    async fn peek_many(
        &self,
        _: usize,
        _: &CallOptions,
    ) -> Result<Vec<PeekedMessage>, MessagingError> {
        Ok(Vec::new())
    }

    async fn receive_one(
        &self,
        options: &ReceiveOptions,
    ) -> Result<Option<ReceivedMessage>, MessagingError> {
        Ok(self.receive_many(1, options).await?.into_iter().next())
    }

    async fn receive_many(
        &self,
        max: usize,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(max);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(bodies)) => Ok(bodies.into_iter().map(|b| self.received(b)).collect()),
            Some(Err(err)) => Err(err),
            None => {
                let wait = options.max_wait.unwrap_or(Duration::from_secs(3600));
                run_cancellable(options.cancel.as_ref(), async {
                    tokio::time::sleep(wait).await;
                    Ok(Vec::new())
                })
                .await
            }
        }
    }
}

fn fast_options(source: &CancellationSource) -> StreamOptions {
    StreamOptions::new()
        .with_batch_size(2)
        .with_poll_wait(Duration::from_millis(10))
        .with_error_backoff(Duration::from_millis(10))
        .with_cancellation(source.signal())
}

#[tokio::test]
async fn test_stream_yields_messages_in_order_across_polls() {
    let receiver = ScriptedReceiver::new(vec![
        Ok(vec!["one", "two"]),
        Ok(vec![]),
        Ok(vec!["three"]),
    ]);
    let source = CancellationSource::new();
    let mut stream = receiver.receive_stream(fast_options(&source));

    let mut bodies = Vec::new();
    for _ in 0..3 {
        let message = stream.next().await.unwrap().unwrap();
        bodies.push(message.content_string().to_string());
    }

    assert_eq!(bodies, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_stream_keeps_polling_until_cancelled() {
    let receiver = ScriptedReceiver::new(vec![Ok(vec!["only"])]);
    let source = CancellationSource::new();
    let mut stream = receiver.receive_stream(fast_options(&source));

    assert!(stream.next().await.is_some());
    let idle = tokio::time::timeout(Duration::from_millis(60), stream.next()).await;
    assert!(idle.is_err(), "stream should still be waiting for messages");

    source.cancel();
    let ended = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap();

    assert!(ended.is_none());
    assert!(receiver.polls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_cancel_while_waiting_ends_stream() {
    let receiver = ScriptedReceiver::new(vec![]);
    let source = CancellationSource::new();
    let options = fast_options(&source).with_poll_wait(Duration::from_secs(60));
    let mut stream = receiver.receive_stream(options);

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        source.cancel();
    };
    let (next, ()) = tokio::join!(stream.next(), canceller);

    assert!(next.is_none());
}

#[tokio::test]
async fn test_transport_error_is_yielded_and_stream_continues() {
    let receiver = ScriptedReceiver::new(vec![
        Err(MessagingError::transport("connection reset")),
        Ok(vec!["after-error"]),
    ]);
    let source = CancellationSource::new();
    let mut stream = receiver.receive_stream(fast_options(&source));

    let first = stream.next().await.unwrap();
    let second = stream.next().await.unwrap();

    assert!(matches!(first, Err(MessagingError::Transport { .. })));
    assert_eq!(second.unwrap().content_string(), "after-error");
}

#[tokio::test]
async fn test_already_cancelled_stream_is_empty() {
    let receiver = ScriptedReceiver::new(vec![Ok(vec!["never"])]);
    let source = CancellationSource::new();
    source.cancel();

    let mut stream = receiver.receive_stream(fast_options(&source));

    assert!(stream.next().await.is_none());
    assert_eq!(receiver.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_batch_size_requests_one() {
    let receiver = ScriptedReceiver::new(vec![Ok(vec!["x"])]);
    let source = CancellationSource::new();
    let mut stream = receiver.receive_stream(fast_options(&source).with_batch_size(0));

    stream.next().await.unwrap().unwrap();

    assert_eq!(receiver.requested.lock().unwrap()[0], 1);
}

#[test]
fn test_options_default_from_config() {
    let config = StreamConfig {
        batch_size: 3,
        poll_wait_ms: 200,
        error_backoff_ms: 50,
    };

    let options = StreamOptions::from_config(&config);

    assert_eq!(options.batch_size, 3);
    assert_eq!(options.poll_wait, Duration::from_millis(200));
    assert_eq!(options.error_backoff, Duration::from_millis(50));
    assert!(options.cancel.is_none());
}
