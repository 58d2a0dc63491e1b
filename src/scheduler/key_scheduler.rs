use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::metrics::SCHEDULER_QUEUES_METRIC;

#[derive(Default)]
struct QueueState {
    /// Some ticket currently owns the key
    granted: bool,
    /// Waiters in arrival order
    waiters: VecDeque<oneshot::Sender<()>>,
    /// Holder plus waiters not yet skipped
    live: u32,
}

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct SchedulerInner {
    queues: Mutex<HashMap<String, Arc<Queue>>>,
}

enum Admission {
    Granted,
    Pending(oneshot::Receiver<()>),
}

impl SchedulerInner {
    fn admit(
        &self,
        key: &str,
    ) -> (Arc<Queue>, Admission) {
        let mut queues = self.queues.lock();
        let queue = match queues.get(key) {
            Some(queue) => queue.clone(),
            None => {
                let queue = Arc::new(Queue::default());
                queues.insert(key.to_string(), queue.clone());
                SCHEDULER_QUEUES_METRIC.inc();
                queue
            }
        };

        let mut state = queue.state.lock();
        state.live += 1;
        if !state.granted {
            state.granted = true;
            drop(state);
            return (queue, Admission::Granted);
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        drop(state);
        (queue, Admission::Pending(rx))
    }

    /// Hands the key to the next waiter that is still listening, or marks it
    /// free. Drops the queue once nobody is left.
    fn release(
        &self,
        key: &str,
        queue: &Arc<Queue>,
    ) {
        let mut queues = self.queues.lock();
        let mut state = queue.state.lock();
        state.live = state.live.saturating_sub(1);

        let mut handed_over = false;
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                handed_over = true;
                break;
            }
            // Waiter went away before its turn.
            state.live = state.live.saturating_sub(1);
            trace!(key, "skipping abandoned waiter");
        }
        if !handed_over {
            state.granted = false;
        }

        if state.live == 0 {
            let ours = queues.get(key).is_some_and(|q| Arc::ptr_eq(q, queue));
            if ours {
                queues.remove(key);
                SCHEDULER_QUEUES_METRIC.dec();
                trace!(key, "queue removed");
            }
        }
    }
}

/// Exclusive ownership of one key's critical section.
///
/// Releasing happens on [`KeyScheduler::done`] or when the ticket is dropped.
#[must_use = "the key stays locked until the ticket is released"]
pub struct Ticket {
    key: String,
    queue: Arc<Queue>,
    scheduler: Arc<SchedulerInner>,
}

impl Ticket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Ticket {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Ticket").field("key", &self.key).finish()
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.scheduler.release(&self.key, &self.queue);
    }
}

/// Releases the key if a pending `wait` future is dropped after the grant
/// was already sent to it.
struct PendingGrant {
    key: String,
    queue: Arc<Queue>,
    scheduler: Arc<SchedulerInner>,
    rx: Option<oneshot::Receiver<()>>,
}

impl Drop for PendingGrant {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };
        rx.close();
        if rx.try_recv().is_ok() {
            debug!(key = %self.key, "wait cancelled after grant, passing the key on");
            self.scheduler.release(&self.key, &self.queue);
        }
    }
}

/// Per-key FIFO lock table.
///
/// ```
/// use dm_cache::KeyScheduler;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let scheduler = KeyScheduler::new();
/// let ticket = scheduler.wait("/Root/root/Tenant/t1").await;
/// // critical section
/// scheduler.done(ticket);
/// assert!(!scheduler.contains_key("/Root/root/Tenant/t1"));
/// # }
/// ```
#[derive(Clone, Default)]
pub struct KeyScheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for KeyScheduler {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("KeyScheduler")
            .field("queued_keys", &self.queued_keys())
            .finish()
    }
}

impl KeyScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the caller owns `key`. Waiters on the same key are served
    /// in arrival order.
    ///
    /// Dropping the returned future before it completes gives up the place
    /// in line without stalling later waiters.
    pub async fn wait(
        &self,
        key: impl Into<String>,
    ) -> Ticket {
        let key = key.into();
        let (queue, admission) = self.inner.admit(&key);
        match admission {
            Admission::Granted => self.ticket(key, queue),
            Admission::Pending(rx) => {
                let mut pending = PendingGrant {
                    key,
                    queue,
                    scheduler: self.inner.clone(),
                    rx: Some(rx),
                };
                if let Some(rx) = pending.rx.as_mut() {
                    if rx.await.is_err() {
                        error!(key = %pending.key, "waiter sender dropped without a grant");
                    }
                }
                // Granted: the ticket owns the release from here on.
                pending.rx = None;
                self.ticket(pending.key.clone(), pending.queue.clone())
            }
        }
    }

    /// Blocking variant of [`wait`](Self::wait) for plain threads. Must not
    /// be called from inside an async runtime.
    pub fn wait_blocking(
        &self,
        key: impl Into<String>,
    ) -> Ticket {
        let key = key.into();
        let (queue, admission) = self.inner.admit(&key);
        if let Admission::Pending(rx) = admission {
            if rx.blocking_recv().is_err() {
                error!(key = %key, "waiter sender dropped without a grant");
            }
        }
        self.ticket(key, queue)
    }

    /// Ends the critical section and hands the key to the next waiter.
    pub fn done(
        &self,
        ticket: Ticket,
    ) {
        drop(ticket);
    }

    /// Keys that currently have a holder or waiters, sorted.
    pub fn queued_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.queues.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.inner.queues.lock().contains_key(key)
    }

    fn ticket(
        &self,
        key: String,
        queue: Arc<Queue>,
    ) -> Ticket {
        Ticket {
            key,
            queue,
            scheduler: self.inner.clone(),
        }
    }
}
