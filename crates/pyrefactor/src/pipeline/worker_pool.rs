//! Pool of OS threads running file transforms.
//!
//! Each worker owns a handle to the run's [`OperationIndex`], handed over once
//! at spawn. Jobs carry only the file path and its content; answers come back
//! over a oneshot channel per job.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, PoisonError},
    thread::JoinHandle,
};

use anyhow::{Context, Result, anyhow};
use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{debug, trace, warn};
use tokio::sync::oneshot;

use crate::{
    operations::OperationIndex,
    transform::{TransformRequest, TransformResult, transform_file},
};

struct Job {
    request: TransformRequest,
    reply: oneshot::Sender<Result<TransformResult>>,
}

#[derive(Debug)]
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers sharing `operations`
    pub fn new(size: usize, operations: Arc<OperationIndex>) -> Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = receiver.clone();
            let operations = Arc::clone(&operations);
            let handle = std::thread::Builder::new()
                .name(format!("pyrefactor-worker-{id}"))
                .spawn(move || worker_loop(id, &receiver, &operations))
                .with_context(|| format!("Failed to spawn worker thread {id}"))?;
            workers.push(handle);
        }
        debug!("Started {size} transform worker(s)");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of worker threads that have not been joined yet
    pub fn live_workers(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Transform one file on a worker thread
    pub async fn run(&self, request: TransformRequest) -> Result<TransformResult> {
        let (reply, response) = oneshot::channel();
        let file_path = request.file_path.clone();
        {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            let sender = sender
                .as_ref()
                .ok_or_else(|| anyhow!("Worker pool is shut down"))?;
            sender
                .send(Job { request, reply })
                .map_err(|_| anyhow!("All workers have exited"))?;
        }

        response.await.with_context(|| {
            format!(
                "Worker dropped the transform of {} without answering",
                file_path.display()
            )
        })?
    }

    /// Close the job channel and join every worker thread
    pub async fn shutdown(&self) -> Result<()> {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if workers.is_empty() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || {
            for worker in workers {
                let name = worker.thread().name().unwrap_or("worker").to_string();
                if worker.join().is_err() {
                    warn!("Worker thread {name} exited with a panic");
                }
            }
        })
        .await
        .context("Failed to join worker threads")?;
        debug!("Transform workers shut down");
        Ok(())
    }
}

fn worker_loop(id: usize, jobs: &Receiver<Job>, operations: &OperationIndex) {
    for Job { request, reply } in jobs {
        let file_path = request.file_path.clone();
        trace!("Worker {id} transforming {}", file_path.display());

        let result = catch_unwind(AssertUnwindSafe(|| transform_file(request, operations)))
            .unwrap_or_else(|payload| {
                Err(anyhow!(
                    "Transform of {} panicked: {}",
                    file_path.display(),
                    panic_message(payload.as_ref())
                ))
            });

        if reply.send(result).is_err() {
            trace!("Result for {} was no longer awaited", file_path.display());
        }
    }
    trace!("Worker {id} stopping");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::operations::{OperationConfig, RenameOperation};

    fn operations() -> Arc<OperationIndex> {
        Arc::new(OperationIndex::new(&OperationConfig {
            rename: vec![RenameOperation::new("a", "c", "b")],
            moves: vec![],
        }))
    }

    fn request(path: &str, content: &str) -> TransformRequest {
        TransformRequest {
            file_path: PathBuf::from(path),
            package: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_jobs_are_transformed_on_workers() {
        let pool = WorkerPool::new(2, operations()).expect("pool should start");

        let result = pool
            .run(request("m.py", "from b import a\nprint(a)\n"))
            .await
            .expect("transform should succeed");

        assert_eq!(result.content, "from b import c\nprint(c)\n");
        assert_eq!(result.file_path, PathBuf::from("m.py"));
        pool.shutdown().await.expect("shutdown should succeed");
    }

    #[tokio::test]
    async fn test_transform_errors_are_returned_not_raised() {
        let pool = WorkerPool::new(1, operations()).expect("pool should start");

        let error = pool
            .run(request("broken.py", "def (:\n"))
            .await
            .expect_err("invalid syntax should fail");
        assert!(error.to_string().contains("broken.py"));

        let ok = pool.run(request("fine.py", "x = 1\n")).await;
        assert!(ok.is_ok(), "worker should survive a failed job");
        pool.shutdown().await.expect("shutdown should succeed");
    }

    #[tokio::test]
    async fn test_shutdown_joins_every_worker() {
        let pool = WorkerPool::new(3, operations()).expect("pool should start");
        assert_eq!(pool.live_workers(), 3);

        pool.shutdown().await.expect("shutdown should succeed");
        assert_eq!(pool.live_workers(), 0);

        let error = pool
            .run(request("late.py", "x = 1\n"))
            .await
            .expect_err("a closed pool should reject jobs");
        assert!(error.to_string().contains("shut down"));
    }

    #[test]
    fn test_panic_message_from_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(literal.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
