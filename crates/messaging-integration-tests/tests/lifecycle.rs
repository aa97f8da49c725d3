//! Integration tests for the received-message lifecycle
//!
//! These tests verify:
//! - Settlement is final; a second terminal operation is a lifecycle error
//! - Abandon redelivers with the delivery count raised by one
//! - Lock renewal pushes the deadline forward
//! - Deferral hides a message until fetched by sequence number
//! - Dead-lettering, explicit or by delivery count, lands in the dead-letter origin
//! - Lapsed locks return the message for redelivery

mod common;

use common::{fast_broker, fast_config, init_tracing, publish_texts, wait};
use messaging_runtime::{
    providers::memory::{DEAD_LETTER_DESCRIPTION, DEAD_LETTER_REASON, MAX_DELIVERY_COUNT_EXCEEDED},
    BaseMessage, CallOptions, InMemoryBroker, LifecycleError, LockState, MessageReceiver,
    MessagingClient, MessagingError, Origin, PropertyValue, Receivable, ReceiveOptions,
    ReceivedMessage,
};
use std::time::Duration;

async fn receive(receiver: &dyn MessageReceiver) -> anyhow::Result<ReceivedMessage> {
    receiver
        .receive_one(&wait(500))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no message at {}", receiver.origin()))
}

/// Verify that completing twice fails the second time without touching the broker
#[tokio::test]
async fn test_complete_twice_is_a_lifecycle_error() -> anyhow::Result<()> {
    let broker = fast_broker();
    let queue = broker.use_queue("payments")?;
    publish_texts(queue.sender().as_ref(), &["pay"]).await?;

    let message = receive(&queue).await?;
    message.complete(&CallOptions::new()).await?;
    let second = message.complete(&CallOptions::new()).await;

    assert!(matches!(
        second,
        Err(MessagingError::Lifecycle(LifecycleError::AlreadySettled { .. }))
    ));
    assert!(matches!(message.state(), LockState::Settled { .. }));
    Ok(())
}

/// Verify that abandon increments the delivery count by exactly one
#[tokio::test]
async fn test_abandon_then_receive_increments_delivery_count() -> anyhow::Result<()> {
    let broker = fast_broker();
    let queue = broker.use_queue("retries")?;
    publish_texts(queue.sender().as_ref(), &["job"]).await?;

    let first = receive(&queue).await?;
    first.abandon(&CallOptions::new()).await?;
    let second = receive(&queue).await?;

    assert_eq!(second.message_id(), first.message_id());
    assert_eq!(second.delivery_count(), first.delivery_count() + 1);
    Ok(())
}

/// Verify that renewal moves the lock deadline strictly forward and keeps
/// the message past its original deadline
#[tokio::test]
async fn test_renew_lock_extends_processing_window() -> anyhow::Result<()> {
    let broker = fast_broker();
    let queue = broker.use_queue("long-running")?;
    publish_texts(queue.sender().as_ref(), &["report"]).await?;
    let message = receive(&queue).await?;
    let original = message.locked_until();

    let mut previous = original;
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let renewed = message.renew_lock(&CallOptions::new()).await?;
        assert!(renewed > previous);
        previous = renewed;
    }

    assert!(original.is_past());
    message.complete(&CallOptions::new()).await?;
    Ok(())
}

/// Verify that deferred messages are invisible to receive and come back by
/// sequence number
#[tokio::test]
async fn test_defer_and_receive_deferred() -> anyhow::Result<()> {
    let broker = fast_broker();
    publish_texts(broker.use_queue_sender("workflow")?.as_ref(), &["step-2", "step-1"]).await?;
    let receiver = broker.receiver(Origin::queue("workflow")?)?;

    let early = receive(&receiver).await?;
    let sequence = early.sequence_number();
    early.defer(&CallOptions::new()).await?;
    let next = receive(&receiver).await?;
    next.complete(&CallOptions::new()).await?;

    let nothing = receiver.receive_one(&ReceiveOptions::immediate()).await?;
    let deferred = receiver
        .receive_deferred(&[sequence], &CallOptions::new())
        .await?;

    assert_eq!(next.content_string(), "step-1");
    assert!(nothing.is_none());
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].content_string(), "step-2");
    deferred[0].complete(&CallOptions::new()).await?;
    Ok(())
}

/// Verify that an explicit dead-letter carries its reason to the
/// dead-letter origin
#[tokio::test]
async fn test_dead_letter_is_receivable_with_reason() -> anyhow::Result<()> {
    let broker = fast_broker();
    let queue = broker.use_queue("imports")?;
    publish_texts(queue.sender().as_ref(), &["{broken"]).await?;

    receive(&queue)
        .await?
        .dead_letter("ParseError", "unterminated object", &CallOptions::new())
        .await?;
    let dead_letters = broker.use_dead_letter(queue.origin())?;
    let dead = receive(dead_letters.as_ref()).await?;

    assert_eq!(dead.content_string(), "{broken");
    assert_eq!(
        dead.provider_properties().get(DEAD_LETTER_REASON),
        Some(&PropertyValue::from("ParseError"))
    );
    assert_eq!(
        dead.provider_properties().get(DEAD_LETTER_DESCRIPTION),
        Some(&PropertyValue::from("unterminated object"))
    );
    assert!(queue
        .receive_one(&ReceiveOptions::immediate())
        .await?
        .is_none());
    Ok(())
}

/// Verify that a message nobody settles keeps coming back until it runs
/// out of deliveries, then lands in the dead-letter origin
#[tokio::test]
async fn test_lock_expiry_redelivers_until_max_delivery_count() -> anyhow::Result<()> {
    init_tracing();
    let broker = InMemoryBroker::new(
        fast_config()
            .with_lock_duration(Duration::from_millis(30))
            .with_max_delivery_count(3),
    );
    let queue = broker.use_queue("flaky")?;
    publish_texts(queue.sender().as_ref(), &["crashes-worker"]).await?;

    let mut deliveries = Vec::new();
    for _ in 0..3 {
        let message = receive(&queue).await?;
        deliveries.push(message.delivery_count());
    }
    let dead = receive(broker.use_dead_letter(queue.origin())?.as_ref()).await?;

    assert_eq!(deliveries, vec![1, 2, 3]);
    assert_eq!(
        dead.provider_properties().get(DEAD_LETTER_REASON),
        Some(&PropertyValue::from(MAX_DELIVERY_COUNT_EXCEEDED))
    );
    Ok(())
}

/// Verify that concurrent receivers never share a message
#[tokio::test]
async fn test_competing_consumers_receive_distinct_messages() -> anyhow::Result<()> {
    let broker = fast_broker();
    let bodies: Vec<String> = (0..20).map(|i| format!("task-{i}")).collect();
    let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
    publish_texts(broker.use_queue_sender("tasks")?.as_ref(), &refs).await?;

    let mut workers = Vec::new();
    for _ in 0..4 {
        let receiver = broker.use_queue_receiver("tasks")?;
        workers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(message) = receiver.receive_one(&ReceiveOptions::immediate()).await? {
                seen.push(message.content_string().to_string());
                message.complete(&CallOptions::new()).await?;
            }
            Ok::<_, MessagingError>(seen)
        }));
    }

    let mut all = Vec::new();
    for worker in workers {
        all.extend(worker.await??);
    }
    all.sort();
    let mut expected = bodies.clone();
    expected.sort();

    assert_eq!(all, expected);
    Ok(())
}
