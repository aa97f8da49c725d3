//! Cooperative cancellation for messaging operations.
//!
//! A [`CancellationSource`] owns the trigger; any number of cloned
//! [`CancellationSignal`]s observe it. Operations check the signal at every
//! poll boundary and fail with [`MessagingError::Cancelled`] once it fires.

use crate::error::MessagingError;
use std::future::Future;
use tokio::sync::watch;

/// Owner side of a cancellation signal
#[derive(Debug)]
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    /// Create a new, not yet cancelled, source
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Get a signal observing this source
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Cancel every operation observing this source
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation source
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the source is cancelled.
    ///
    /// Never resolves if the source is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Resolve when `signal` fires; pend forever when there is no signal
pub(crate) async fn cancelled(signal: Option<&CancellationSignal>) {
    match signal {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

/// Fail fast if `signal` has already fired
pub(crate) fn ensure_not_cancelled(signal: Option<&CancellationSignal>) -> Result<(), MessagingError> {
    match signal {
        Some(signal) if signal.is_cancelled() => Err(MessagingError::Cancelled),
        _ => Ok(()),
    }
}

/// Run `operation`, abandoning it with [`MessagingError::Cancelled`] if the
/// signal fires first
///
/// # Examples
///
/// ```rust
/// use messaging_runtime::{run_cancellable, CancellationSource, MessagingError};
///
/// # tokio_test::block_on(async {
/// let source = CancellationSource::new();
/// source.cancel();
///
/// let result = run_cancellable(Some(&source.signal()), async { Ok::<_, MessagingError>(1) }).await;
/// assert!(matches!(result, Err(MessagingError::Cancelled)));
/// # });
/// ```
pub async fn run_cancellable<T, F>(
    signal: Option<&CancellationSignal>,
    operation: F,
) -> Result<T, MessagingError>
where
    F: Future<Output = Result<T, MessagingError>>,
{
    ensure_not_cancelled(signal)?;
    tokio::select! {
        biased;
        _ = cancelled(signal) => Err(MessagingError::Cancelled),
        result = operation => result,
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
