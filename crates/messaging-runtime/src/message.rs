//! Message types for broker operations including core domain identifiers.
//!
//! Outbound messages are built once by the caller and moved into a sender.
//! Receivable messages are read-only snapshots produced by a receiver; see
//! [`crate::lifecycle`] for the lock-bound [`ReceivedMessage`] variant.
//!
//! [`ReceivedMessage`]: crate::lifecycle::ReceivedMessage

use crate::cancel::CancellationSignal;
use crate::error::{SerializationError, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// Media type set by the JSON convenience constructors
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated name of a queue, topic or subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityName(String);

impl EntityName {
    /// Create new entity name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();

        if name.is_empty() || name.len() > 260 {
            return Err(ValidationError::OutOfRange {
                field: "entity_name".to_string(),
                message: "must be 1-260 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '~'))
        {
            return Err(ValidationError::InvalidFormat {
                field: "entity_name".to_string(),
                message: "only ASCII alphanumeric and '-', '_', '.', '/', '~' allowed".to_string(),
            });
        }

        if name.starts_with('/') || name.ends_with('/') {
            return Err(ValidationError::InvalidFormat {
                field: "entity_name".to_string(),
                message: "no leading or trailing '/'".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get entity name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The named source a receiver pulls from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// A queue
    Queue(EntityName),
    /// A subscription on a topic
    Subscription {
        topic: EntityName,
        subscription: EntityName,
    },
    /// The dead-letter sub-queue of another origin
    DeadLetter(Box<Origin>),
}

impl Origin {
    /// Queue origin from a raw name
    pub fn queue(name: &str) -> Result<Self, ValidationError> {
        Ok(Self::Queue(EntityName::new(name)?))
    }

    /// Topic subscription origin from raw names
    pub fn subscription(topic: &str, subscription: &str) -> Result<Self, ValidationError> {
        Ok(Self::Subscription {
            topic: EntityName::new(topic)?,
            subscription: EntityName::new(subscription)?,
        })
    }

    /// The dead-letter sub-queue of this origin.
    ///
    /// The dead-letter origin of a dead-letter origin is itself.
    pub fn dead_letter(&self) -> Self {
        match self {
            Self::DeadLetter(_) => self.clone(),
            other => Self::DeadLetter(Box::new(other.clone())),
        }
    }

    /// Whether this origin is a dead-letter sub-queue
    pub fn is_dead_letter(&self) -> bool {
        matches!(self, Self::DeadLetter(_))
    }

    /// Queue name, when this is a queue origin
    pub fn queue_name(&self) -> Option<&EntityName> {
        match self {
            Self::Queue(name) => Some(name),
            _ => None,
        }
    }

    /// Topic and subscription names, when this is a subscription origin
    pub fn topic_subscription(&self) -> Option<(&EntityName, &EntityName)> {
        match self {
            Self::Subscription {
                topic,
                subscription,
            } => Some((topic, subscription)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue(name) => write!(f, "{}", name),
            Self::Subscription {
                topic,
                subscription,
            } => write!(f, "{}/Subscriptions/{}", topic, subscription),
            Self::DeadLetter(inner) => write!(f, "{}/$DeadLetterQueue", inner),
        }
    }
}

/// Where a sender publishes messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    Queue(EntityName),
    Topic(EntityName),
}

impl Destination {
    /// Get the destination entity name
    pub fn name(&self) -> &EntityName {
        match self {
            Self::Queue(name) | Self::Topic(name) => name,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue(name) => write!(f, "queue:{}", name),
            Self::Topic(name) => write!(f, "topic:{}", name),
        }
    }
}

/// Unique identifier for messages within the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// The latest representable timestamp, used for "never expires"
    pub fn max() -> Self {
        Self(DateTime::<Utc>::MAX_UTC)
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp shifted forward by `duration`, saturating at [`Timestamp::max`]
    pub fn plus(&self, duration: Duration) -> Self {
        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map_or_else(Self::max, Self)
    }

    /// Time from now until this timestamp, zero when already past
    pub fn remaining(&self) -> Duration {
        (self.0 - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether this timestamp is at or before the current time
    pub fn is_past(&self) -> bool {
        Utc::now() >= self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Properties
// ============================================================================

/// A caller-defined or provider-defined message property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(Timestamp),
    Duration(Duration),
}

impl PropertyValue {
    /// Text value, if this is a text property
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Integer value, if this is an integer property
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Duration value, if this is a duration property
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Duration(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Timestamp> for PropertyValue {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Duration> for PropertyValue {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

/// Map of property name to value
pub type Properties = HashMap<String, PropertyValue>;

/// Canonical names every adapter maps to and from its native message metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardProperty {
    MessageId,
    Content,
    ContentString,
    ContentType,
    CorrelationId,
    Subject,
    TimeToLive,
    ReplyTo,
}

impl StandardProperty {
    /// All standard properties in canonical order
    pub const ALL: [StandardProperty; 8] = [
        Self::MessageId,
        Self::Content,
        Self::ContentString,
        Self::ContentType,
        Self::CorrelationId,
        Self::Subject,
        Self::TimeToLive,
        Self::ReplyTo,
    ];

    /// Canonical property name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageId => "MessageId",
            Self::Content => "Content",
            Self::ContentString => "ContentString",
            Self::ContentType => "ContentType",
            Self::CorrelationId => "CorrelationId",
            Self::Subject => "Subject",
            Self::TimeToLive => "TimeToLive",
            Self::ReplyTo => "ReplyTo",
        }
    }
}

impl std::fmt::Display for StandardProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StandardProperty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|property| property.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "standard_property".to_string(),
                message: format!("'{}' is not a standard property name", s),
            })
    }
}

// ============================================================================
// Content
// ============================================================================

/// Immutable message payload with a lazily decoded UTF-8 view.
///
/// The string view is computed at most once and shared by every reader.
/// Invalid UTF-8 sequences decode to U+FFFD.
#[derive(Clone, Default)]
pub struct Content {
    bytes: Bytes,
    text: OnceLock<String>,
}

impl Content {
    /// Content from raw bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            text: OnceLock::new(),
        }
    }

    /// Content from a string; the string view is known up front
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            bytes: Bytes::copy_from_slice(text.as_bytes()),
            text: OnceLock::from(text),
        }
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the raw bytes
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// UTF-8 view of the bytes
    pub fn as_str(&self) -> &str {
        self.text
            .get_or_init(|| String::from_utf8_lossy(&self.bytes).into_owned())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Content")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PartialEq for Content {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Content {}

// ============================================================================
// Message Types
// ============================================================================

/// Read-only view shared by outbound and received messages
pub trait BaseMessage {
    /// Message identifier; `None` only for an outbound message whose id the
    /// adapter will assign on send
    fn id(&self) -> Option<&MessageId>;

    /// Raw content bytes
    fn content(&self) -> &[u8];

    /// UTF-8 view of the content, decoded once and cached
    fn content_string(&self) -> &str;

    fn content_type(&self) -> Option<&str>;

    /// Identifier linking related messages across a workflow
    fn correlation_id(&self) -> Option<&str>;

    /// Address replies should be sent to
    fn reply_to(&self) -> Option<&str>;
}

/// A message to be published to a queue or topic
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    id: Option<MessageId>,
    content: Content,
    content_type: Option<String>,
    correlation_id: Option<String>,
    reply_to: Option<String>,
    subject: Option<String>,
    time_to_live: Option<Duration>,
    properties: Properties,
    provider_properties: Properties,
}

impl OutboundMessage {
    /// Create new message with raw content
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self::from_content(Content::new(content))
    }

    /// Create new message with string content
    pub fn from_text(content: impl Into<String>) -> Self {
        Self::from_content(Content::from_text(content))
    }

    /// Create new message with string content and properties
    pub fn with_properties(content: impl Into<String>, properties: Properties) -> Self {
        let mut message = Self::from_text(content);
        message.properties = properties;
        message
    }

    /// Create new message with string content, properties and provider hints
    pub fn with_all_properties(
        content: impl Into<String>,
        properties: Properties,
        provider_properties: Properties,
    ) -> Self {
        let mut message = Self::with_properties(content, properties);
        message.provider_properties = provider_properties;
        message
    }

    /// Create a JSON message from any serializable value
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::JsonError`] when the value cannot be
    /// serialized.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, SerializationError> {
        let text = serde_json::to_string(value)?;
        Ok(Self::from_text(text).with_content_type(JSON_CONTENT_TYPE))
    }

    /// Create a JSON message with properties
    pub fn json_with_properties<T: Serialize + ?Sized>(
        value: &T,
        properties: Properties,
    ) -> Result<Self, SerializationError> {
        let mut message = Self::json(value)?;
        message.properties = properties;
        Ok(message)
    }

    /// Create a JSON message with properties and provider hints
    pub fn json_with_all_properties<T: Serialize + ?Sized>(
        value: &T,
        properties: Properties,
        provider_properties: Properties,
    ) -> Result<Self, SerializationError> {
        let mut message = Self::json_with_properties(value, properties)?;
        message.provider_properties = provider_properties;
        Ok(message)
    }

    fn from_content(content: Content) -> Self {
        Self {
            id: None,
            content,
            content_type: None,
            correlation_id: None,
            reply_to: None,
            subject: None,
            time_to_live: None,
            properties: Properties::new(),
            provider_properties: Properties::new(),
        }
    }

    /// Assign a caller-chosen message id
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = non_empty(content_type.into());
        self
    }

    /// Add correlation ID for tracking
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = non_empty(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = non_empty(reply_to.into());
        self
    }

    /// Set the routing/filter subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = non_empty(subject.into());
        self
    }

    /// Add time-to-live for message expiration
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Add message property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add provider-specific hint
    pub fn with_provider_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.provider_properties.insert(key.into(), value.into());
        self
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn time_to_live(&self) -> Option<Duration> {
        self.time_to_live
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Mutable properties, for adjustments before the message is sent
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn provider_properties(&self) -> &Properties {
        &self.provider_properties
    }

    pub fn provider_properties_mut(&mut self) -> &mut Properties {
        &mut self.provider_properties
    }

    /// The message payload
    pub fn body(&self) -> &Content {
        &self.content
    }

    /// System metadata keyed by [`StandardProperty`] names.
    ///
    /// `Content` and `ContentString` are carried by the payload itself and
    /// never appear in this map.
    pub fn system_properties(&self) -> Properties {
        let mut system = Properties::new();
        if let Some(id) = &self.id {
            system.insert(StandardProperty::MessageId.to_string(), id.as_str().into());
        }
        let text_fields = [
            (StandardProperty::ContentType, &self.content_type),
            (StandardProperty::CorrelationId, &self.correlation_id),
            (StandardProperty::Subject, &self.subject),
            (StandardProperty::ReplyTo, &self.reply_to),
        ];
        for (property, value) in text_fields {
            if let Some(value) = value {
                system.insert(property.to_string(), value.as_str().into());
            }
        }
        if let Some(ttl) = self.time_to_live {
            system.insert(StandardProperty::TimeToLive.to_string(), ttl.into());
        }
        system
    }
}

impl BaseMessage for OutboundMessage {
    fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }

    fn content(&self) -> &[u8] {
        self.content.as_bytes()
    }

    fn content_string(&self) -> &str {
        self.content.as_str()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

// ============================================================================
// Receivable Messages
// ============================================================================

/// Snapshot of a message as held by the broker at the time it was read
#[derive(Debug, Clone)]
pub struct ReceivableMessage {
    id: MessageId,
    content: Content,
    content_type: Option<String>,
    correlation_id: Option<String>,
    reply_to: Option<String>,
    subject: Option<String>,
    enqueued_time: Timestamp,
    expires_at: Timestamp,
    delivery_count: u32,
    sequence_number: i64,
    properties: Properties,
    provider_properties: Properties,
    origin: Origin,
}

impl ReceivableMessage {
    /// Create a snapshot; used by adapters when mapping native messages
    pub fn new(
        origin: Origin,
        id: MessageId,
        content: Content,
        enqueued_time: Timestamp,
        sequence_number: i64,
    ) -> Self {
        Self {
            id,
            content,
            content_type: None,
            correlation_id: None,
            reply_to: None,
            subject: None,
            enqueued_time,
            expires_at: Timestamp::max(),
            delivery_count: 0,
            sequence_number,
            properties: Properties::new(),
            provider_properties: Properties::new(),
            origin,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    /// Set the expiry; never earlier than the enqueued time
    pub fn with_expires_at(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = std::cmp::max(expires_at, self.enqueued_time);
        self
    }

    pub fn with_delivery_count(mut self, delivery_count: u32) -> Self {
        self.delivery_count = delivery_count;
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_provider_properties(mut self, provider_properties: Properties) -> Self {
        self.provider_properties = provider_properties;
        self
    }

    pub fn message_id(&self) -> &MessageId {
        &self.id
    }

    pub fn body(&self) -> &Content {
        &self.content
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn enqueued_time(&self) -> Timestamp {
        self.enqueued_time
    }

    /// When the message itself expires at the origin (not the lock)
    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Number of times the message has been handed to a receiver
    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// Broker-assigned position of the message in its origin
    pub fn sequence_number(&self) -> i64 {
        self.sequence_number
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn provider_properties(&self) -> &Properties {
        &self.provider_properties
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

impl BaseMessage for ReceivableMessage {
    fn id(&self) -> Option<&MessageId> {
        Some(&self.id)
    }

    fn content(&self) -> &[u8] {
        self.content.as_bytes()
    }

    fn content_string(&self) -> &str {
        self.content.as_str()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }
}

/// Access to the snapshot behind a peeked or received message
pub trait Receivable: BaseMessage {
    fn snapshot(&self) -> &ReceivableMessage;

    fn message_id(&self) -> &MessageId {
        self.snapshot().message_id()
    }

    fn subject(&self) -> Option<&str> {
        self.snapshot().subject()
    }

    fn enqueued_time(&self) -> Timestamp {
        self.snapshot().enqueued_time()
    }

    fn expires_at(&self) -> Timestamp {
        self.snapshot().expires_at()
    }

    /// Times the broker has handed this message to a receiver.
    ///
    /// At least 1 for received messages. A peeked message that has never
    /// been received reports 0; adapters whose broker counts differently
    /// report the broker's value.
    fn delivery_count(&self) -> u32 {
        self.snapshot().delivery_count()
    }

    fn sequence_number(&self) -> i64 {
        self.snapshot().sequence_number()
    }

    fn properties(&self) -> &Properties {
        self.snapshot().properties()
    }

    fn provider_properties(&self) -> &Properties {
        self.snapshot().provider_properties()
    }

    fn origin(&self) -> &Origin {
        self.snapshot().origin()
    }
}

/// Implements [`BaseMessage`] for a wrapper by delegating to its snapshot
macro_rules! delegate_base_message {
    ($wrapper:ty) => {
        impl $crate::message::BaseMessage for $wrapper {
            fn id(&self) -> Option<&$crate::message::MessageId> {
                $crate::message::BaseMessage::id($crate::message::Receivable::snapshot(self))
            }

            fn content(&self) -> &[u8] {
                $crate::message::BaseMessage::content($crate::message::Receivable::snapshot(self))
            }

            fn content_string(&self) -> &str {
                $crate::message::BaseMessage::content_string($crate::message::Receivable::snapshot(self))
            }

            fn content_type(&self) -> Option<&str> {
                $crate::message::BaseMessage::content_type($crate::message::Receivable::snapshot(self))
            }

            fn correlation_id(&self) -> Option<&str> {
                $crate::message::BaseMessage::correlation_id($crate::message::Receivable::snapshot(self))
            }

            fn reply_to(&self) -> Option<&str> {
                $crate::message::BaseMessage::reply_to($crate::message::Receivable::snapshot(self))
            }
        }
    };
}

pub(crate) use delegate_base_message;

/// A message read without locking or consuming it.
///
/// Peeked messages expose no lifecycle operations.
#[derive(Debug, Clone)]
pub struct PeekedMessage {
    message: ReceivableMessage,
}

impl PeekedMessage {
    pub fn new(message: ReceivableMessage) -> Self {
        Self { message }
    }

    pub fn into_inner(self) -> ReceivableMessage {
        self.message
    }
}

impl Receivable for PeekedMessage {
    fn snapshot(&self) -> &ReceivableMessage {
        &self.message
    }
}

delegate_base_message!(PeekedMessage);

// ============================================================================
// Call and Receive Options
// ============================================================================

/// Options shared by publish, peek and settlement calls
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Cancellation signal; absent means the call cannot be cancelled
    pub cancel: Option<CancellationSignal>,
}

impl CallOptions {
    /// Create new call options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a cancellation signal
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Configuration options for receiving messages
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    /// Maximum time to wait for the first message.
    ///
    /// Absent means block until a message arrives or the call is cancelled;
    /// zero means return immediately with whatever is ready.
    pub max_wait: Option<Duration>,
    /// Cancellation signal; absent means the call cannot be cancelled
    pub cancel: Option<CancellationSignal>,
}

impl ReceiveOptions {
    /// Create new receive options with defaults (block indefinitely)
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at most `max_wait` for the first message
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Never block; return whatever is ready now
    pub fn immediate() -> Self {
        Self::new().with_max_wait(Duration::ZERO)
    }

    /// Attach a cancellation signal
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn call_options(&self) -> CallOptions {
        CallOptions {
            cancel: self.cancel.clone(),
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
