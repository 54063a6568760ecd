// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded FIFO queue with a configurable overflow policy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use skiff_config::OverflowPolicy;
use skiff_core::SkiffError;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

/// What happened to a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The message was queued without affecting anything else.
    Enqueued,
    /// The message was queued after evicting the oldest queued message.
    DisplacedOldest,
}

/// A single bounded queue. Producers follow `policy` when it is full;
/// consumers wait until an item arrives or the queue is closed and drained.
pub(crate) struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    policy: OverflowPolicy,
    publish_timeout: Option<Duration>,
    items: Mutex<VecDeque<T>>,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    pub(crate) fn new(
        name: &'static str,
        capacity: usize,
        policy: OverflowPolicy,
        publish_timeout: Option<Duration>,
    ) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            policy,
            publish_timeout,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn overflow(&self) -> SkiffError {
        SkiffError::BusOverflow {
            queue: self.name,
            capacity: self.capacity,
        }
    }

    pub(crate) async fn push(&self, item: T) -> Result<PublishOutcome, SkiffError> {
        let deadline = self
            .publish_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);

        loop {
            // Register for wakeups before inspecting the queue so a pop that
            // lands between the check and the await is not missed.
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut items = self.items.lock().await;
                if self.closed.load(Ordering::Acquire) {
                    return Err(SkiffError::BusClosed);
                }
                if items.len() < self.capacity {
                    items.push_back(item);
                    drop(items);
                    self.not_empty.notify_one();
                    return Ok(PublishOutcome::Enqueued);
                }
                match self.policy {
                    OverflowPolicy::Reject => return Err(self.overflow()),
                    OverflowPolicy::DropOldest => {
                        items.pop_front();
                        items.push_back(item);
                        drop(items);
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(
                            queue = self.name,
                            capacity = self.capacity,
                            dropped_total = dropped,
                            "queue full, displaced oldest message"
                        );
                        self.not_empty.notify_one();
                        return Ok(PublishOutcome::DisplacedOldest);
                    }
                    OverflowPolicy::Block => {}
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        warn!(
                            queue = self.name,
                            capacity = self.capacity,
                            "publish timed out waiting for queue space"
                        );
                        return Err(self.overflow());
                    }
                }
                None => notified.await,
            }
        }
    }

    pub(crate) async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop().await {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    pub(crate) async fn try_pop(&self) -> Option<T> {
        let item = self.items.lock().await.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub(crate) async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) async fn close(&self) {
        // Taking the lock orders the flag against in-flight pushes.
        let _items = self.items.lock().await;
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
