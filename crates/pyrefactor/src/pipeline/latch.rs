//! Counted barrier used to track work that is in progress.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Notify;

/// A counter that can be awaited until it drops to zero.
///
/// Each unit of work holds a [`LatchGuard`]; the count goes down when the guard
/// is dropped, wherever that happens.
#[derive(Debug, Default)]
pub struct Latch {
    count: AtomicUsize,
    zero: Notify,
}

impl Latch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one more unit of work
    pub fn enter(self: &Arc<Self>) -> LatchGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        LatchGuard {
            latch: Arc::clone(self),
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_zero(&self) -> bool {
        self.count() == 0
    }

    /// Wait until no guard is alive
    pub async fn wait_zero(&self) {
        loop {
            let notified = self.zero.notified();
            tokio::pin!(notified);
            // register before checking, a release in between must wake us
            notified.as_mut().enable();
            if self.is_zero() {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps a [`Latch`] above zero while alive
#[derive(Debug)]
pub struct LatchGuard {
    latch: Arc<Latch>,
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        if self.latch.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.latch.zero.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_empty() {
        let latch = Latch::new();
        tokio::time::timeout(Duration::from_secs(1), latch.wait_zero())
            .await
            .expect("empty latch should not block");
    }

    #[tokio::test]
    async fn test_wait_blocks_until_last_guard_drops() {
        let latch = Latch::new();
        let first = latch.enter();
        let second = latch.enter();
        assert_eq!(latch.count(), 2);

        let waiter = tokio::spawn({
            let latch = Arc::clone(&latch);
            async move { latch.wait_zero().await }
        });

        drop(first);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake up")
            .expect("waiter task should not panic");
        assert!(latch.is_zero());
    }

    #[tokio::test]
    async fn test_guard_can_move_across_tasks() {
        let latch = Latch::new();
        let guard = latch.enter();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(guard);
        });

        tokio::time::timeout(Duration::from_secs(1), latch.wait_zero())
            .await
            .expect("guard dropped in another task should release the latch");
    }
}
