//! In-memory broker implementing the full messaging contract.
//!
//! This module provides a reference broker that:
//! - Keeps queues, topics and subscriptions in process memory
//! - Fans topic publishes out to every subscription present at send time
//! - Grants lock leases on receive and reclaims them when they lapse
//! - Supports deferral, dead-letter sub-queues and message TTL
//! - Dead-letters messages that exceed the configured delivery count
//!
//! It is intended for unit testing of consumers, local development, and as
//! the reference other adapters are checked against.
//!
//! Broker state sits behind a single `std::sync::Mutex` that is never held
//! across an `.await`. Receivers waiting for messages park on a per-store
//! [`Notify`] and re-check every `idle_recheck_interval` so lapsed locks are
//! picked up even when nothing is published.

use crate::cancel::{cancelled, ensure_not_cancelled};
use crate::client::{ensure_provider, MessagingClient, NativeClient};
use crate::config::{InMemoryConfig, ProviderKind};
use crate::error::{LifecycleError, MessagingError, ValidationError};
use crate::lifecycle::{Disposition, LockToken, MessageSettler, ReceivedMessage};
use crate::message::{
    BaseMessage, CallOptions, Content, Destination, EntityName, MessageId, Origin,
    OutboundMessage, PeekedMessage, Properties, PropertyValue, ReceivableMessage,
    ReceiveOptions, StandardProperty, Timestamp,
};
use crate::receiver::{validate_max_messages, MessageReceiver};
use crate::sender::{MessageSender, OutgoingMessage};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Provider property carrying the dead-letter reason
pub const DEAD_LETTER_REASON: &str = "DeadLetterReason";

/// Provider property carrying the dead-letter description
pub const DEAD_LETTER_DESCRIPTION: &str = "DeadLetterErrorDescription";

/// Reason recorded when a message runs out of delivery attempts
pub const MAX_DELIVERY_COUNT_EXCEEDED: &str = "MaxDeliveryCountExceeded";

const RENEW_MINIMUM_STEP: Duration = Duration::from_millis(1);

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Everything the broker holds
struct BrokerState {
    queues: HashMap<EntityName, Entity>,
    topics: HashMap<EntityName, Topic>,
    available: bool,
    next_sequence: i64,
}

impl BrokerState {
    fn new() -> Self {
        Self {
            queues: HashMap::new(),
            topics: HashMap::new(),
            available: true,
            next_sequence: 1,
        }
    }

    fn ensure_available(&self) -> Result<(), MessagingError> {
        if self.available {
            Ok(())
        } else {
            Err(MessagingError::transport("in-memory broker is unavailable"))
        }
    }

    fn next_sequence(&mut self) -> i64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Get or create the queue or subscription behind an origin
    fn entity_mut(&mut self, origin: &Origin) -> &mut Entity {
        match origin {
            Origin::Queue(name) => self.queues.entry(name.clone()).or_default(),
            Origin::Subscription {
                topic,
                subscription,
            } => self
                .topics
                .entry(topic.clone())
                .or_default()
                .subscriptions
                .entry(subscription.clone())
                .or_default(),
            Origin::DeadLetter(inner) => self.entity_mut(inner),
        }
    }
}

/// A topic and the subscriptions it fans out to
#[derive(Default)]
struct Topic {
    subscriptions: HashMap<EntityName, Entity>,
}

/// A queue or subscription with its dead-letter sub-queue
#[derive(Default)]
struct Entity {
    main: MessageStore,
    dead_letter: MessageStore,
}

impl Entity {
    fn store_mut(&mut self, dead_letter: bool) -> &mut MessageStore {
        if dead_letter {
            &mut self.dead_letter
        } else {
            &mut self.main
        }
    }

    /// Drop expired messages and reclaim lapsed locks
    fn sweep(&mut self, origin: &Origin, max_delivery_count: u32, now: Timestamp) {
        let before = self.main.ready.len() + self.main.deferred.len();
        self.main.ready.retain(|message| message.expires_at > now);
        self.main.deferred.retain(|_, message| message.expires_at > now);
        let dropped = before - (self.main.ready.len() + self.main.deferred.len());
        if dropped > 0 {
            debug!(origin = %origin, count = dropped, "Dropped expired messages");
        }

        for dead_letter in [false, true] {
            let lapsed = self.store_mut(dead_letter).take_lapsed_locks(now);
            for locked in lapsed {
                warn!(
                    origin = %origin,
                    sequence_number = locked.message.sequence_number,
                    delivery_count = locked.message.delivery_count,
                    "Lock expired; reclaiming message"
                );
                self.release(origin, locked, dead_letter, max_delivery_count);
            }
        }
    }

    /// Return a message whose lock ended without settlement
    fn release(
        &mut self,
        origin: &Origin,
        locked: LockedMessage,
        in_dead_letter: bool,
        max_delivery_count: u32,
    ) {
        let LockedMessage {
            message,
            from_deferred,
            ..
        } = locked;

        if !in_dead_letter && message.delivery_count >= max_delivery_count {
            let description = format!(
                "message was delivered {} times without being settled",
                message.delivery_count
            );
            self.move_to_dead_letter(origin, message, MAX_DELIVERY_COUNT_EXCEEDED, &description);
            return;
        }

        let store = self.store_mut(in_dead_letter);
        if from_deferred {
            store.deferred.insert(message.sequence_number, message);
        } else {
            store.enqueue(message);
        }
    }

    fn move_to_dead_letter(
        &mut self,
        origin: &Origin,
        mut message: StoredMessage,
        reason: &str,
        description: &str,
    ) {
        info!(
            origin = %origin,
            sequence_number = message.sequence_number,
            reason = %reason,
            "Dead-lettering message"
        );
        message
            .provider_properties
            .insert(DEAD_LETTER_REASON.to_string(), reason.into());
        message
            .provider_properties
            .insert(DEAD_LETTER_DESCRIPTION.to_string(), description.into());
        self.dead_letter.enqueue(message);
    }
}

/// Messages of one origin, partitioned by visibility
#[derive(Default)]
struct MessageStore {
    /// Available messages in sequence order
    ready: VecDeque<StoredMessage>,
    /// Messages handed to a receiver and not yet settled
    locked: HashMap<LockToken, LockedMessage>,
    /// Deferred messages keyed by sequence number
    deferred: BTreeMap<i64, StoredMessage>,
    /// Wakes receivers parked on this store
    notify: Arc<Notify>,
}

impl MessageStore {
    /// Make a message available, keeping sequence order
    fn enqueue(&mut self, message: StoredMessage) {
        let position = self
            .ready
            .partition_point(|queued| queued.sequence_number < message.sequence_number);
        self.ready.insert(position, message);
        self.notify.notify_waiters();
    }

    fn take_lapsed_locks(&mut self, now: Timestamp) -> Vec<LockedMessage> {
        let lapsed: Vec<LockToken> = self
            .locked
            .iter()
            .filter(|(_, locked)| locked.locked_until <= now)
            .map(|(token, _)| token.clone())
            .collect();

        let mut reclaimed: Vec<LockedMessage> = lapsed
            .iter()
            .filter_map(|token| self.locked.remove(token))
            .collect();
        reclaimed.sort_by_key(|locked| locked.message.sequence_number);
        reclaimed
    }

    /// Hand a message out under a new lock, counting the delivery
    fn lock_message(
        &mut self,
        mut message: StoredMessage,
        locked_until: Timestamp,
        from_deferred: bool,
    ) -> (LockToken, StoredMessage) {
        message.delivery_count += 1;
        let token = LockToken::new();
        self.locked.insert(
            token.clone(),
            LockedMessage {
                message: message.clone(),
                locked_until,
                from_deferred,
            },
        );
        (token, message)
    }
}

/// A message stored at the broker with its metadata
#[derive(Clone)]
struct StoredMessage {
    content: Content,
    /// System metadata keyed by [`StandardProperty`] names
    system: Properties,
    properties: Properties,
    provider_properties: Properties,
    enqueued_time: Timestamp,
    expires_at: Timestamp,
    sequence_number: i64,
    delivery_count: u32,
}

impl StoredMessage {
    fn from_outgoing(
        outgoing: &OutgoingMessage,
        id: &MessageId,
        sequence_number: i64,
        default_ttl: Option<Duration>,
        now: Timestamp,
    ) -> Self {
        let message = &outgoing.message;
        let mut system = message.system_properties();
        system.insert(
            StandardProperty::MessageId.to_string(),
            id.as_str().into(),
        );
        let expires_at = message
            .time_to_live()
            .or(default_ttl)
            .map_or_else(Timestamp::max, |ttl| now.plus(ttl));

        Self {
            content: message.body().clone(),
            system,
            properties: outgoing.properties.clone(),
            provider_properties: message.provider_properties().clone(),
            enqueued_time: now,
            expires_at,
            sequence_number,
            delivery_count: 0,
        }
    }

    fn system_text(&self, property: StandardProperty) -> Option<String> {
        self.system
            .get(property.as_str())
            .and_then(PropertyValue::as_text)
            .map(str::to_string)
    }

    /// Map the stored metadata back onto a snapshot
    fn snapshot(&self, origin: &Origin) -> ReceivableMessage {
        let id = self
            .system_text(StandardProperty::MessageId)
            .and_then(|id| id.parse().ok())
            .unwrap_or_default();

        ReceivableMessage::new(
            origin.clone(),
            id,
            self.content.clone(),
            self.enqueued_time,
            self.sequence_number,
        )
        .with_content_type(self.system_text(StandardProperty::ContentType))
        .with_correlation_id(self.system_text(StandardProperty::CorrelationId))
        .with_reply_to(self.system_text(StandardProperty::ReplyTo))
        .with_subject(self.system_text(StandardProperty::Subject))
        .with_expires_at(self.expires_at)
        .with_delivery_count(self.delivery_count)
        .with_properties(self.properties.clone())
        .with_provider_properties(self.provider_properties.clone())
    }
}

/// A message currently being processed
struct LockedMessage {
    message: StoredMessage,
    locked_until: Timestamp,
    /// Whether the message goes back to the deferred set on abandon
    from_deferred: bool,
}

// ============================================================================
// InMemoryBroker
// ============================================================================

struct BrokerInner {
    state: Mutex<BrokerState>,
    config: InMemoryConfig,
}

/// In-memory broker; clones share the same state
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    /// Create new in-memory broker with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &InMemoryConfig {
        &self.inner.config
    }

    /// Concrete receiver for an origin, exposing [`InMemoryReceiver::receive_deferred`]
    pub fn receiver(&self, origin: Origin) -> Result<InMemoryReceiver, MessagingError> {
        self.lock()?.entity_mut(&origin);
        Ok(InMemoryReceiver {
            broker: self.clone(),
            origin,
        })
    }

    /// Concrete sender for a destination
    pub fn sender(&self, destination: Destination) -> InMemorySender {
        InMemorySender {
            broker: self.clone(),
            destination,
        }
    }

    /// Simulate the broker going away; every operation fails with a
    /// transport error until it is made available again
    pub fn set_available(&self, available: bool) -> Result<(), MessagingError> {
        let mut state = self.lock()?;
        state.available = available;
        info!(available, "In-memory broker availability changed");
        Ok(())
    }

    /// Number of messages available for normal receive at `origin`
    pub fn ready_count(&self, origin: &Origin) -> Result<usize, MessagingError> {
        let mut state = self.lock()?;
        let entity = state.entity_mut(origin);
        entity.sweep(origin, self.inner.config.max_delivery_count, Timestamp::now());
        Ok(entity.store_mut(origin.is_dead_letter()).ready.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, MessagingError> {
        self.inner
            .state
            .lock()
            .map_err(|_| MessagingError::transport("in-memory broker state is poisoned"))
    }

    fn validate_outgoing(&self, outgoing: &[OutgoingMessage]) -> Result<(), ValidationError> {
        let config = &self.inner.config;
        if outgoing.len() > config.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                size: outgoing.len(),
                max_size: config.max_batch_size,
            });
        }
        if let Some(oversized) = outgoing
            .iter()
            .find(|o| o.message.body().len() > config.max_message_size)
        {
            return Err(ValidationError::MessageTooLarge {
                size: oversized.message.body().len(),
                max_size: config.max_message_size,
            });
        }
        Ok(())
    }

    fn publish(
        &self,
        destination: &Destination,
        outgoing: Vec<OutgoingMessage>,
    ) -> Result<Vec<MessageId>, MessagingError> {
        self.validate_outgoing(&outgoing)?;

        let mut state = self.lock()?;
        state.ensure_available()?;
        let now = Timestamp::now();
        let default_ttl = self.inner.config.default_message_ttl();

        let mut ids = Vec::with_capacity(outgoing.len());
        for message in &outgoing {
            let id = message.message.id().cloned().unwrap_or_default();
            let sequence = state.next_sequence();
            let stored = StoredMessage::from_outgoing(message, &id, sequence, default_ttl, now);

            match destination {
                Destination::Queue(name) => {
                    state.queues.entry(name.clone()).or_default().main.enqueue(stored);
                }
                Destination::Topic(name) => {
                    let topic = state.topics.entry(name.clone()).or_default();
                    if topic.subscriptions.is_empty() {
                        debug!(topic = %name, "Topic has no subscriptions; message discarded");
                    }
                    for subscription in topic.subscriptions.values_mut() {
                        subscription.main.enqueue(stored.clone());
                    }
                }
            }
            ids.push(id);
        }

        debug!(destination = %destination, count = ids.len(), "Published messages");
        Ok(ids)
    }

    fn notifier(&self, origin: &Origin) -> Result<Arc<Notify>, MessagingError> {
        let mut state = self.lock()?;
        let notify = state
            .entity_mut(origin)
            .store_mut(origin.is_dead_letter())
            .notify
            .clone();
        Ok(notify)
    }

    fn peek(&self, origin: &Origin, max: usize) -> Result<Vec<PeekedMessage>, MessagingError> {
        let mut state = self.lock()?;
        state.ensure_available()?;
        let entity = state.entity_mut(origin);
        entity.sweep(origin, self.inner.config.max_delivery_count, Timestamp::now());

        Ok(entity
            .store_mut(origin.is_dead_letter())
            .ready
            .iter()
            .take(max)
            .map(|message| PeekedMessage::new(message.snapshot(origin)))
            .collect())
    }

    /// Lock up to `max` ready messages
    fn take(&self, origin: &Origin, max: usize) -> Result<Vec<ReceivedMessage>, MessagingError> {
        let mut state = self.lock()?;
        state.ensure_available()?;
        let now = Timestamp::now();
        let locked_until = now.plus(self.inner.config.lock_duration());
        let entity = state.entity_mut(origin);
        entity.sweep(origin, self.inner.config.max_delivery_count, now);
        let store = entity.store_mut(origin.is_dead_letter());

        let count = max.min(store.ready.len());
        let taken: Vec<StoredMessage> = store.ready.drain(..count).collect();
        Ok(taken
            .into_iter()
            .map(|message| {
                let (token, message) = store.lock_message(message, locked_until, false);
                self.received(origin, &message, token, locked_until)
            })
            .collect())
    }

    fn take_deferred(
        &self,
        origin: &Origin,
        sequence_numbers: &[i64],
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        let mut state = self.lock()?;
        state.ensure_available()?;
        let now = Timestamp::now();
        let locked_until = now.plus(self.inner.config.lock_duration());
        let entity = state.entity_mut(origin);
        entity.sweep(origin, self.inner.config.max_delivery_count, now);
        let store = entity.store_mut(origin.is_dead_letter());

        if let Some(missing) = sequence_numbers
            .iter()
            .find(|sequence| !store.deferred.contains_key(*sequence))
        {
            return Err(ValidationError::InvalidFormat {
                field: "sequence_numbers".to_string(),
                message: format!("no deferred message with sequence number {}", missing),
            }
            .into());
        }

        Ok(sequence_numbers
            .iter()
            .filter_map(|sequence| store.deferred.remove(sequence))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|message| {
                let (token, message) = store.lock_message(message, locked_until, true);
                self.received(origin, &message, token, locked_until)
            })
            .collect())
    }

    fn received(
        &self,
        origin: &Origin,
        message: &StoredMessage,
        lock_token: LockToken,
        locked_until: Timestamp,
    ) -> ReceivedMessage {
        let snapshot = message.snapshot(origin);
        let settler = Arc::new(InMemorySettler {
            broker: self.clone(),
            origin: origin.clone(),
            message_id: snapshot.message_id().clone(),
        });
        ReceivedMessage::new(snapshot, lock_token, locked_until, settler)
    }

    fn settle(
        &self,
        origin: &Origin,
        message_id: &MessageId,
        lock_token: &LockToken,
        disposition: &Disposition,
    ) -> Result<(), MessagingError> {
        if origin.is_dead_letter() && matches!(disposition, Disposition::DeadLetter { .. }) {
            return Err(ValidationError::NotPermitted {
                origin: origin.to_string(),
                message: "messages cannot be dead-lettered from a dead-letter origin".to_string(),
            }
            .into());
        }

        let mut state = self.lock()?;
        state.ensure_available()?;
        let max_delivery_count = self.inner.config.max_delivery_count;
        let in_dead_letter = origin.is_dead_letter();
        let entity = state.entity_mut(origin);
        entity.sweep(origin, max_delivery_count, Timestamp::now());

        let locked = entity
            .store_mut(in_dead_letter)
            .locked
            .remove(lock_token)
            .ok_or_else(|| LifecycleError::LockLost {
                message_id: message_id.clone(),
            })?;

        match disposition {
            Disposition::Complete => {
                debug!(origin = %origin, message_id = %message_id, "Message completed");
            }
            Disposition::Abandon => {
                debug!(origin = %origin, message_id = %message_id, "Message abandoned");
                entity.release(origin, locked, in_dead_letter, max_delivery_count);
            }
            Disposition::Defer => {
                debug!(origin = %origin, message_id = %message_id, "Message deferred");
                let message = locked.message;
                entity
                    .store_mut(in_dead_letter)
                    .deferred
                    .insert(message.sequence_number, message);
            }
            Disposition::DeadLetter {
                reason,
                description,
            } => {
                entity.move_to_dead_letter(origin, locked.message, reason, description);
            }
        }
        Ok(())
    }

    fn renew(
        &self,
        origin: &Origin,
        message_id: &MessageId,
        lock_token: &LockToken,
    ) -> Result<Timestamp, MessagingError> {
        let mut state = self.lock()?;
        state.ensure_available()?;
        let now = Timestamp::now();
        let entity = state.entity_mut(origin);
        entity.sweep(origin, self.inner.config.max_delivery_count, now);

        let locked = entity
            .store_mut(origin.is_dead_letter())
            .locked
            .get_mut(lock_token)
            .ok_or_else(|| LifecycleError::LockLost {
                message_id: message_id.clone(),
            })?;

        let renewed = std::cmp::max(
            now.plus(self.inner.config.lock_duration()),
            locked.locked_until.plus(RENEW_MINIMUM_STEP),
        );
        if renewed <= locked.locked_until {
            return Err(ValidationError::OutOfRange {
                field: "lock_duration".to_string(),
                message: format!(
                    "lock already held until {}; no later deadline exists",
                    locked.locked_until
                ),
            }
            .into());
        }
        locked.locked_until = renewed;
        debug!(origin = %origin, message_id = %message_id, locked_until = %renewed, "Lock renewed");
        Ok(renewed)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl MessagingClient for InMemoryBroker {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::InMemory
    }

    fn use_sender(
        &self,
        destination: Destination,
    ) -> Result<Arc<dyn MessageSender>, MessagingError> {
        Ok(Arc::new(self.sender(destination)))
    }

    fn use_receiver(&self, origin: Origin) -> Result<Arc<dyn MessageReceiver>, MessagingError> {
        Ok(Arc::new(self.receiver(origin)?))
    }

    fn native_client(&self, requested: ProviderKind) -> Result<NativeClient, MessagingError> {
        ensure_provider(requested, ProviderKind::InMemory)?;
        Ok(NativeClient::InMemory(self.clone()))
    }
}

// ============================================================================
// Settler
// ============================================================================

/// Settles one delivery against the broker state
struct InMemorySettler {
    broker: InMemoryBroker,
    origin: Origin,
    message_id: MessageId,
}

#[async_trait]
impl MessageSettler for InMemorySettler {
    async fn settle(
        &self,
        lock_token: &LockToken,
        disposition: &Disposition,
    ) -> Result<(), MessagingError> {
        self.broker
            .settle(&self.origin, &self.message_id, lock_token, disposition)
    }

    async fn renew_lock(&self, lock_token: &LockToken) -> Result<Timestamp, MessagingError> {
        self.broker
            .renew(&self.origin, &self.message_id, lock_token)
    }
}

// ============================================================================
// InMemorySender
// ============================================================================

/// Sender publishing to an in-memory queue or topic
#[derive(Debug, Clone)]
pub struct InMemorySender {
    broker: InMemoryBroker,
    destination: Destination,
}

#[async_trait]
impl MessageSender for InMemorySender {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    #[instrument(skip(self, message, options), fields(destination = %self.destination))]
    async fn publish_one(
        &self,
        message: OutboundMessage,
        options: &CallOptions,
    ) -> Result<MessageId, MessagingError> {
        ensure_not_cancelled(options.cancel.as_ref())?;
        let mut ids = self
            .broker
            .publish(&self.destination, vec![OutgoingMessage::single(message)])?;
        ids.pop()
            .ok_or_else(|| MessagingError::transport("broker accepted no message"))
    }

    #[instrument(
        skip(self, messages, common_properties, options),
        fields(destination = %self.destination, count = messages.len())
    )]
    async fn publish_batch(
        &self,
        messages: Vec<OutboundMessage>,
        common_properties: Option<&Properties>,
        options: &CallOptions,
    ) -> Result<Vec<MessageId>, MessagingError> {
        ensure_not_cancelled(options.cancel.as_ref())?;
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let outgoing = OutgoingMessage::batch(messages, common_properties);
        self.broker.publish(&self.destination, outgoing)
    }
}

// ============================================================================
// InMemoryReceiver
// ============================================================================

/// Receiver pulling from an in-memory queue, subscription or dead-letter origin
#[derive(Debug, Clone)]
pub struct InMemoryReceiver {
    broker: InMemoryBroker,
    origin: Origin,
}

impl InMemoryReceiver {
    /// Receive deferred messages by sequence number.
    ///
    /// Either every requested message is locked and returned, in the order
    /// requested, or none is.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidFormat`] when a sequence number does
    /// not name a deferred message at this origin.
    #[instrument(skip(self, options), fields(origin = %self.origin))]
    pub async fn receive_deferred(
        &self,
        sequence_numbers: &[i64],
        options: &CallOptions,
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        ensure_not_cancelled(options.cancel.as_ref())?;
        self.broker.take_deferred(&self.origin, sequence_numbers)
    }

    async fn receive_up_to(
        &self,
        max: usize,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        ensure_not_cancelled(options.cancel.as_ref())?;
        let max = max.min(self.broker.config().max_batch_size);
        let recheck = self.broker.config().idle_recheck_interval();
        // A wait too long to represent as an instant blocks indefinitely
        let deadline = options
            .max_wait
            .and_then(|wait| Instant::now().checked_add(wait));
        let notify = self.broker.notifier(&self.origin)?;

        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let received = self.broker.take(&self.origin, max)?;
            if !received.is_empty() {
                debug!(origin = %self.origin, count = received.len(), "Received messages");
                return Ok(received);
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline <= now {
                        return Ok(Vec::new());
                    }
                    (deadline - now).min(recheck)
                }
                None => recheck,
            };

            tokio::select! {
                biased;
                _ = cancelled(options.cancel.as_ref()) => return Err(MessagingError::Cancelled),
                _ = &mut notified => {}
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

#[async_trait]
impl MessageReceiver for InMemoryReceiver {
    fn origin(&self) -> &Origin {
        &self.origin
    }

    #[instrument(skip(self, options), fields(origin = %self.origin))]
    async fn peek_one(
        &self,
        options: &CallOptions,
    ) -> Result<Option<PeekedMessage>, MessagingError> {
        ensure_not_cancelled(options.cancel.as_ref())?;
        Ok(self.broker.peek(&self.origin, 1)?.into_iter().next())
    }

    #[instrument(skip(self, options), fields(origin = %self.origin))]
    async fn peek_many(
        &self,
        max: usize,
        options: &CallOptions,
    ) -> Result<Vec<PeekedMessage>, MessagingError> {
        validate_max_messages(max)?;
        ensure_not_cancelled(options.cancel.as_ref())?;
        self.broker.peek(&self.origin, max)
    }

    #[instrument(skip(self, options), fields(origin = %self.origin))]
    async fn receive_one(
        &self,
        options: &ReceiveOptions,
    ) -> Result<Option<ReceivedMessage>, MessagingError> {
        Ok(self.receive_up_to(1, options).await?.into_iter().next())
    }

    #[instrument(skip(self, options), fields(origin = %self.origin))]
    async fn receive_many(
        &self,
        max: usize,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, MessagingError> {
        validate_max_messages(max)?;
        self.receive_up_to(max, options).await
    }
}
