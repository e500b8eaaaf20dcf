#![forbid(unsafe_code)]

//! Background subscriptions and their stop signals.
//!
//! Every live channel runs on its own thread and only ever *sends* into the
//! owning session's inbox. The session keeps a [`SubscriptionHandle`] per
//! live channel; cancelling the handle sets the [`StopSignal`], which wakes
//! any pending reconnect delay or receive poll so the worker can close its
//! transport and exit.
//!
//! Each subscription is stamped with a fresh [`SubId`]. Messages carry the id
//! of the subscription that produced them, which is how late messages from a
//! cancelled subscription are recognised and dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use web_time::{Duration, Instant};

/// Unique identifier of one subscription instance.
pub type SubId = u64;

static NEXT_SUB_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-wide unique subscription id.
#[must_use]
pub fn next_sub_id() -> SubId {
    NEXT_SUB_ID.fetch_add(1, Ordering::Relaxed)
}

/// Signal observed by a running subscription.
///
/// Cloneable; all clones observe the same trigger.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    /// Create a new stop signal pair (signal, trigger).
    #[must_use]
    pub fn new() -> (Self, StopTrigger) {
        let inner = Arc::new((Mutex::new(false), Condvar::new()));
        let signal = Self {
            inner: Arc::clone(&inner),
        };
        (signal, StopTrigger { inner })
    }

    /// Check if the stop signal has been triggered.
    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for either the stop signal or a timeout.
    ///
    /// Returns `true` if stopped, `false` if timed out. Spurious wakeups are
    /// absorbed; the full duration elapses unless the signal fires.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
        let deadline = Instant::now() + duration;
        loop {
            if *stopped {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            stopped = guard;
        }
    }
}

/// Trigger side of a [`StopSignal`].
pub struct StopTrigger {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopTrigger {
    /// Signal the subscription to stop. Idempotent.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(|e| e.into_inner());
        *stopped = true;
        cvar.notify_all();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Owning handle of a running subscription.
///
/// Dropping the handle stops the subscription without joining its thread.
pub struct SubscriptionHandle {
    id: SubId,
    trigger: StopTrigger,
    thread: Option<thread::JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Run `work` on a named background thread with a fresh stop signal.
    pub fn spawn<F>(id: SubId, name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let (signal, trigger) = StopSignal::new();
        let name = name.into();
        let thread = match thread::Builder::new()
            .name(name.clone())
            .spawn(move || work(signal))
        {
            Ok(handle) => Some(handle),
            Err(error) => {
                tracing::error!(
                    target: "mailview.subscription",
                    sub_id = id,
                    thread = %name,
                    %error,
                    "failed to spawn subscription thread"
                );
                None
            }
        };
        Self {
            id,
            trigger,
            thread,
        }
    }

    /// Id of the subscription.
    #[must_use]
    pub fn id(&self) -> SubId {
        self.id
    }

    /// Request the subscription to stop. Returns immediately.
    pub fn cancel(&self) {
        self.trigger.stop();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.trigger.is_stopped()
    }

    /// Whether the worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(thread::JoinHandle::is_finished)
    }

    /// Stop the subscription and wait for its thread to exit.
    pub fn join(mut self) {
        self.trigger.stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.trigger.stop();
        // Don't join in drop to avoid blocking
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
