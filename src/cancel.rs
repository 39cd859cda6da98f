use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Cancellation handle for blocking admission.
///
/// Clones share the same state: a caller hands one clone to
/// [`wait`](crate::TokenBucketLimiter::wait) and cancels from anywhere else.
/// The first cancellation wins and its reason is what the resulting
/// [`DeniedError`](crate::DeniedError) carries.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<Option<Arc<str>>>>,
}

impl CancelToken {
    /// Reason reported by [`CancelToken::cancel_after`].
    pub const DEADLINE_EXCEEDED: &'static str = "deadline exceeded";

    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Cancel with the given reason. Calls after the first are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason: Arc<str> = Arc::from(reason.into());
        self.state.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    /// Cancel with [`Self::DEADLINE_EXCEEDED`] once `delay` of wall time has
    /// passed. Spawns a timer task; requires a running Tokio runtime.
    pub fn cancel_after(&self, delay: Duration) {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            token.cancel(Self::DEADLINE_EXCEEDED);
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Cancellation reason, once set.
    pub fn reason(&self) -> Option<Arc<str>> {
        self.state.borrow().clone()
    }

    /// Resolves with the cancellation reason; pends until then.
    pub async fn cancelled(&self) -> Arc<str> {
        let mut rx = self.state.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            // The sender half lives in `self`, so `changed` cannot fail while
            // we are borrowed.
            if rx.changed().await.is_err() {
                return Arc::from(Self::DEADLINE_EXCEEDED);
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
