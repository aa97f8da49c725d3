//! Lifecycle state machine for received messages.
//!
//! A [`ReceivedMessage`] starts out [`LockState::Locked`] and leaves that state
//! exactly once: through a successful settlement (complete, abandon, defer,
//! dead-letter) or when its lock expires. Lock renewal keeps it `Locked` with a
//! later deadline. Any operation attempted after the handle has left the
//! `Locked` state fails with a [`LifecycleError`].
//!
//! # Lock renewal
//!
//! The broker abandons a message on its own once `locked_until` passes.
//! Consumers doing long work must call [`ReceivedMessage::renew_lock`] strictly
//! before the deadline, leaving enough margin for the round trip to the broker;
//! [`ReceivedMessage::lock_remaining`] reports how much of the lease is left.

use crate::cancel::run_cancellable;
use crate::error::{LifecycleError, MessagingError};
use crate::message::{
    delegate_base_message, CallOptions, MessageId, Receivable, ReceivableMessage, Timestamp,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// Dispositions
// ============================================================================

/// Kind of terminal settlement applied to a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispositionKind {
    Complete,
    Abandon,
    Defer,
    DeadLetter,
}

impl std::fmt::Display for DispositionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "completed"),
            Self::Abandon => write!(f, "abandoned"),
            Self::Defer => write!(f, "deferred"),
            Self::DeadLetter => write!(f, "dead-lettered"),
        }
    }
}

/// A terminal settlement request sent to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Remove the message from its origin
    Complete,
    /// Release the lock and make the message available for redelivery
    Abandon,
    /// Keep the message but hide it from normal receives
    Defer,
    /// Move the message to the dead-letter origin
    DeadLetter { reason: String, description: String },
}

impl Disposition {
    pub fn kind(&self) -> DispositionKind {
        match self {
            Self::Complete => DispositionKind::Complete,
            Self::Abandon => DispositionKind::Abandon,
            Self::Defer => DispositionKind::Defer,
            Self::DeadLetter { .. } => DispositionKind::DeadLetter,
        }
    }
}

/// Opaque token identifying one delivery's lock at the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(String);

impl LockToken {
    /// Generate new random lock token
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap a provider-issued token
    pub fn from_provider(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// State Machine
// ============================================================================

/// Lifecycle state of one delivery, as seen by the receiving handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Lock held until the given deadline
    Locked { locked_until: Timestamp },
    /// A terminal operation succeeded while the lock was held
    Settled {
        disposition: DispositionKind,
        locked_until: Timestamp,
    },
    /// The lock ran out or the broker reported it lost
    Expired { locked_until: Timestamp },
}

impl LockState {
    /// Check that an operation may run against this delivery at `now`.
    ///
    /// A `Locked` state whose deadline has passed is reported as expired.
    pub fn admit(&self, message_id: &MessageId, now: Timestamp) -> Result<(), LifecycleError> {
        match *self {
            Self::Locked { locked_until } if now < locked_until => Ok(()),
            Self::Locked { locked_until } | Self::Expired { locked_until } => {
                Err(LifecycleError::LockExpired {
                    message_id: message_id.clone(),
                    locked_until,
                })
            }
            Self::Settled { disposition, .. } => Err(LifecycleError::AlreadySettled {
                message_id: message_id.clone(),
                disposition,
            }),
        }
    }

    /// Whether the delivery can no longer be operated on
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Locked { .. })
    }

    fn locked_until(&self) -> Timestamp {
        match *self {
            Self::Locked { locked_until }
            | Self::Expired { locked_until }
            | Self::Settled { locked_until, .. } => locked_until,
        }
    }
}

// ============================================================================
// Adapter Contract
// ============================================================================

/// Broker-side settlement implemented by each provider adapter
#[async_trait]
pub trait MessageSettler: Send + Sync {
    /// Apply a terminal disposition to the locked delivery.
    ///
    /// Must fail with [`MessagingError::Lifecycle`] when the broker no longer
    /// recognises the lock.
    async fn settle(
        &self,
        lock_token: &LockToken,
        disposition: &Disposition,
    ) -> Result<(), MessagingError>;

    /// Extend the lock, returning the new deadline.
    ///
    /// The returned deadline must be strictly later than the previous one.
    async fn renew_lock(&self, lock_token: &LockToken) -> Result<Timestamp, MessagingError>;
}

// ============================================================================
// Received Message
// ============================================================================

/// A message received under a lock, exposing lifecycle operations.
///
/// Operations on the same handle are serialised, so concurrent terminal calls
/// see exactly one success.
pub struct ReceivedMessage {
    message: ReceivableMessage,
    lock_token: LockToken,
    state: Mutex<LockState>,
    operation: tokio::sync::Mutex<()>,
    settler: Arc<dyn MessageSettler>,
}

impl ReceivedMessage {
    /// Create a lock-bound handle; used by adapters on receive
    pub fn new(
        message: ReceivableMessage,
        lock_token: LockToken,
        locked_until: Timestamp,
        settler: Arc<dyn MessageSettler>,
    ) -> Self {
        Self {
            message,
            lock_token,
            state: Mutex::new(LockState::Locked { locked_until }),
            operation: tokio::sync::Mutex::new(()),
            settler,
        }
    }

    pub fn lock_token(&self) -> &LockToken {
        &self.lock_token
    }

    /// Current lifecycle state
    pub fn state(&self) -> LockState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deadline of the current lock
    pub fn locked_until(&self) -> Timestamp {
        self.state().locked_until()
    }

    /// Time left before the lock expires; zero once settled or expired
    pub fn lock_remaining(&self) -> Duration {
        match self.state() {
            LockState::Locked { locked_until } => locked_until.remaining(),
            _ => Duration::ZERO,
        }
    }

    /// Whether a terminal operation already succeeded
    pub fn is_settled(&self) -> bool {
        matches!(self.state(), LockState::Settled { .. })
    }

    /// Remove the message permanently from its origin
    pub async fn complete(&self, options: &CallOptions) -> Result<(), MessagingError> {
        self.settle(Disposition::Complete, options).await
    }

    /// Release the lock so the message can be delivered again
    pub async fn abandon(&self, options: &CallOptions) -> Result<(), MessagingError> {
        self.settle(Disposition::Abandon, options).await
    }

    /// Hide the message from normal receives while keeping it at the origin
    pub async fn defer(&self, options: &CallOptions) -> Result<(), MessagingError> {
        self.settle(Disposition::Defer, options).await
    }

    /// Move the message to the dead-letter origin
    pub async fn dead_letter(
        &self,
        reason: impl Into<String>,
        description: impl Into<String>,
        options: &CallOptions,
    ) -> Result<(), MessagingError> {
        let disposition = Disposition::DeadLetter {
            reason: reason.into(),
            description: description.into(),
        };
        self.settle(disposition, options).await
    }

    /// Extend the lock, returning the new deadline
    pub async fn renew_lock(&self, options: &CallOptions) -> Result<Timestamp, MessagingError> {
        let _operation = self.operation.lock().await;
        self.admit()?;

        let renewed = run_cancellable(
            options.cancel.as_ref(),
            self.settler.renew_lock(&self.lock_token),
        )
        .await;

        match renewed {
            Ok(locked_until) => {
                self.set_state(LockState::Locked { locked_until });
                Ok(locked_until)
            }
            Err(err) => Err(self.record_failure(err)),
        }
    }

    async fn settle(
        &self,
        disposition: Disposition,
        options: &CallOptions,
    ) -> Result<(), MessagingError> {
        let _operation = self.operation.lock().await;
        self.admit()?;

        let settled = run_cancellable(
            options.cancel.as_ref(),
            self.settler.settle(&self.lock_token, &disposition),
        )
        .await;

        match settled {
            Ok(()) => {
                self.set_state(LockState::Settled {
                    disposition: disposition.kind(),
                    locked_until: self.locked_until(),
                });
                Ok(())
            }
            Err(err) => Err(self.record_failure(err)),
        }
    }

    fn admit(&self) -> Result<(), MessagingError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let admitted = state.admit(self.message.message_id(), Timestamp::now());
        if let Err(LifecycleError::LockExpired { locked_until, .. }) = &admitted {
            *state = LockState::Expired {
                locked_until: *locked_until,
            };
        }
        admitted.map_err(MessagingError::from)
    }

    /// A lifecycle failure from the broker means the lock is gone; anything
    /// else leaves the delivery locked so the caller may retry.
    fn record_failure(&self, err: MessagingError) -> MessagingError {
        if err.is_lifecycle() {
            let locked_until = self.locked_until();
            self.set_state(LockState::Expired { locked_until });
        }
        err
    }

    fn set_state(&self, next: LockState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl Receivable for ReceivedMessage {
    fn snapshot(&self) -> &ReceivableMessage {
        &self.message
    }
}

delegate_base_message!(ReceivedMessage);

impl std::fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("message", &self.message)
            .field("lock_token", &self.lock_token)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
