//! # Work Queue
//!
//! A deduplicating queue of resource names.
//!
//! - An item is queued at most once, however many times it is added.
//! - An item handed to a worker is "processing" until [`WorkQueue::done`].
//!   Adds while processing mark it dirty; it is queued again exactly once
//!   when the worker finishes, so no two workers ever hold the same item.
//! - Delayed adds and rate limited adds re-enter through the same path. An
//!   item has at most one pending wakeup; a later one is dropped while an
//!   earlier or equal one is armed.

use super::backoff::RateLimiter;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct QueueState<T> {
    queue: VecDeque<T>,
    /// Items waiting to be processed, queued or not
    dirty: HashSet<T>,
    processing: HashSet<T>,
    /// Earliest armed wakeup per delayed item
    waiting: HashMap<T, Instant>,
    shutting_down: bool,
}

/// Stand-in deadline for delays too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    rate_limiter: Box<dyn RateLimiter<T>>,
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").finish_non_exhaustive()
    }
}

impl<T> WorkQueue<T>
where
    T: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    #[must_use]
    pub fn new(rate_limiter: Box<dyn RateLimiter<T>>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                waiting: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            rate_limiter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `item` unless it is already waiting
    pub fn add(&self, item: T) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            trace!(?item, "item is processing, marked dirty");
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.notify.notify_one();
    }

    /// Queue `item` once `delay` has elapsed
    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let now = Instant::now();
        let ready_at = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            if state.waiting.get(&item).is_some_and(|armed| *armed <= ready_at) {
                trace!(?item, "earlier wakeup already armed");
                return;
            }
            state.waiting.insert(item.clone(), ready_at);
        }

        let queue = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(ready_at).await;
            let Some(queue) = queue.upgrade() else {
                return;
            };
            {
                let mut state = queue.lock();
                if state.waiting.get(&item) != Some(&ready_at) {
                    // Superseded by an earlier wakeup.
                    return;
                }
                state.waiting.remove(&item);
            }
            queue.add(item);
        });
    }

    /// Items with an armed delayed add
    #[must_use]
    pub fn num_waiting(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Queue `item` after the rate limiter's delay, returning that delay
    pub fn add_rate_limited(self: &Arc<Self>, item: T) -> Duration {
        let delay = self.rate_limiter.when(&item);
        self.add_after(item, delay);
        delay
    }

    /// Reset the rate limiter's memory of `item`
    pub fn forget(&self, item: &T) {
        self.rate_limiter.forget(item);
    }

    #[must_use]
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.rate_limiter.num_requeues(item)
    }

    fn try_take(&self) -> Result<Option<T>, ()> {
        let mut state = self.lock();
        if let Some(item) = state.queue.pop_front() {
            state.dirty.remove(&item);
            state.processing.insert(item.clone());
            let more = !state.queue.is_empty();
            drop(state);
            if more {
                self.notify.notify_one();
            }
            return Ok(Some(item));
        }
        if state.shutting_down {
            return Err(());
        }
        Ok(None)
    }

    /// Wait for the next item. Returns `None` once the queue is shut down and
    /// drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_take() {
                Ok(Some(item)) => return Some(item),
                Ok(None) => notified.await,
                Err(()) => return None,
            }
        }
    }

    /// Mark `item` finished. If it was added while processing it is queued
    /// again.
    pub fn done(&self, item: &T) {
        let mut state = self.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop accepting items and wake every waiting worker
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.shutting_down = true;
        state.waiting.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Items queued and not yet handed to a worker
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
