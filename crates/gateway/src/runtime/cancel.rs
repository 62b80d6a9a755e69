//! Cancellation for the active orchestration cycle.
//!
//! Only one cycle runs at a time. Starting a cycle takes the
//! [`ActiveCycle`] slot and hands out a [`CancelToken`]; the slot is
//! released when the returned [`CycleLease`] is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use px_domain::error::{Error, Result};

/// A cancellation token that can be checked by the runtime loop or
/// awaited inside `select!`.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ActiveCycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Slot for the one running cycle.
#[derive(Default)]
pub struct ActiveCycle {
    current: Mutex<Option<CancelToken>>,
}

impl ActiveCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. Fails with [`Error::Busy`] while another cycle runs.
    pub fn begin(self: &Arc<Self>) -> Result<CycleLease> {
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(Error::Busy);
        }
        let token = CancelToken::new();
        *current = Some(token.clone());
        Ok(CycleLease {
            slot: Arc::clone(self),
            token,
        })
    }

    /// Cancel the running cycle. Returns true if one was running.
    pub fn cancel(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().is_some()
    }
}

/// Ownership of the active slot for the duration of one cycle.
pub struct CycleLease {
    slot: Arc<ActiveCycle>,
    token: CancelToken,
}

impl CycleLease {
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for CycleLease {
    fn drop(&mut self) {
        self.slot.current.lock().take();
    }
}
