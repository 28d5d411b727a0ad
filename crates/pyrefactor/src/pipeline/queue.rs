//! Bounded task queue on top of the tokio runtime.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use log::trace;
use tokio::{sync::Semaphore, task::JoinHandle};

use super::latch::Latch;

/// Runs at most `concurrency` tasks at a time and reports when it is idle.
///
/// A task counts as pending from the moment it is spawned, before it is
/// admitted, until it has finished.
#[derive(Debug)]
pub struct TaskQueue {
    name: &'static str,
    permits: Arc<Semaphore>,
    pending: Arc<Latch>,
    completed: Arc<AtomicUsize>,
}

impl TaskQueue {
    pub fn new(name: &'static str, concurrency: usize) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            pending: Latch::new(),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let pending = self.pending.enter();
        let permits = Arc::clone(&self.permits);
        let completed = Arc::clone(&self.completed);
        let name = self.name;

        tokio::spawn(async move {
            let _pending = pending;
            let Ok(_permit) = permits.acquire_owned().await else {
                trace!("{name} queue closed before task admission");
                return;
            };
            task.await;
            completed.fetch_add(1, Ordering::AcqRel);
        })
    }

    pub fn pending(&self) -> usize {
        self.pending.count()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_zero()
    }

    /// Wait until no task is queued or running
    pub async fn on_idle(&self) {
        self.pending.wait_zero().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let queue = TaskQueue::new("test", 2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            queue.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        queue.on_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.completed(), 8);
        assert!(queue.is_idle());
    }

    #[tokio::test]
    async fn test_task_is_pending_before_admission() {
        let queue = TaskQueue::new("test", 1);
        let (release, blocked) = tokio::sync::oneshot::channel::<()>();

        queue.spawn(async move {
            let _ = blocked.await;
        });
        queue.spawn(async {});
        assert_eq!(queue.pending(), 2);

        release.send(()).expect("first task should be waiting");
        queue.on_idle().await;
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.completed(), 2);
    }
}
