//! Per-call execution context: an optional deadline plus an optional
//! cancellation signal.
//!
//! Every storage operation receives a [`Context`] and runs its work through
//! [`Context::run`]. When the deadline passes or the caller cancels, the
//! in-flight future is dropped and [`StorageError::Canceled`] is returned.

use crate::error::{Result, StorageError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Handle used to cancel a [`Context`] (and every clone of it).
#[derive(Debug, Clone)]
pub struct Canceller {
    state: Arc<CancelState>,
}

impl Canceller {
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<Arc<CancelState>>,
}

impl Context {
    /// A context that never expires and cannot be cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Creates a cancellable context together with its [`Canceller`].
    pub fn cancellable() -> (Self, Canceller) {
        let state = Arc::new(CancelState::default());
        let ctx = Self {
            deadline: None,
            cancel: Some(state.clone()),
        };
        (ctx, Canceller { state })
    }

    /// Derives a context that keeps this one's cancellation signal and uses
    /// the earlier of the two deadlines.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(current) if current <= candidate => current,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|state| state.cancelled.load(Ordering::SeqCst))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fails fast when the context is already done.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(StorageError::Canceled("context canceled".to_string()));
        }
        if self.is_expired() {
            return Err(StorageError::Canceled("deadline exceeded".to_string()));
        }
        Ok(())
    }

    /// Runs `operation` until it completes, the deadline passes, or the
    /// context is cancelled, whichever happens first.
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let bounded = async {
            match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, operation).await {
                    Ok(result) => result,
                    Err(_) => Err(StorageError::Canceled("deadline exceeded".to_string())),
                },
                None => operation.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(StorageError::Canceled("context canceled".to_string())),
            result = bounded => result,
        }
    }

    async fn cancelled(&self) {
        let Some(state) = &self.cancel else {
            return std::future::pending().await;
        };

        loop {
            let notified = state.notify.notified();
            if state.cancelled.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}
