//! Concurrent read → transform → write pipeline.
//!
//! Every file passes through three stages: a task on the bounded read queue,
//! a job on the worker pool, and a task on the bounded write queue. A file is
//! counted in flight from the end of its read until its write has finished, so
//! the run only completes once both queues are idle and nothing is in flight.

mod hooks;
mod latch;
mod queue;
mod store;
mod worker_pool;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use anyhow::Result;
use log::{debug, error, info, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub use hooks::{Hooks, NoopHooks};
pub use latch::{Latch, LatchGuard};
pub use queue::TaskQueue;
pub use store::{DryRunStore, FileStore, FsStore, MemoryStore};
pub use worker_pool::WorkerPool;

use crate::{
    operations::{OperationConfig, OperationIndex},
    transform::{TransformRequest, TransformResult},
};

pub const DEFAULT_READ_CONCURRENCY: usize = 10;
pub const DEFAULT_WRITE_CONCURRENCY: usize = 10;

/// What to do when a file fails to read, transform or write
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop scheduling work and fail the run with the first error
    #[default]
    Abort,
    /// Keep going and report every failure at the end
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub read_concurrency: usize,
    pub write_concurrency: usize,
    /// Worker threads, `None` for the available parallelism
    pub workers: Option<usize>,
    pub error_policy: ErrorPolicy,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            read_concurrency: DEFAULT_READ_CONCURRENCY,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            workers: None,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl ExecutorOptions {
    fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file_path: PathBuf,
    pub message: String,
}

/// Counters of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub files: usize,
    /// Files read successfully
    pub reads: usize,
    /// Files that finished the write stage, written or not
    pub writes: usize,
    /// Files whose content changed and was written
    pub written: usize,
    /// Files left untouched because no operation matched
    pub unchanged: usize,
    pub failures: Vec<FileFailure>,
}

/// Applies an operation set to many files concurrently
pub struct TransformExecutor {
    options: ExecutorOptions,
    store: Arc<dyn FileStore>,
    hooks: Arc<dyn Hooks>,
    packages: Arc<FxHashMap<PathBuf, String>>,
}

impl std::fmt::Debug for TransformExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformExecutor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TransformExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            store: Arc::new(FsStore),
            hooks: Arc::new(NoopHooks),
            packages: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Packages of the files, so relative imports match absolute operations
    #[must_use]
    pub fn with_packages(mut self, packages: FxHashMap<PathBuf, String>) -> Self {
        self.packages = Arc::new(packages);
        self
    }

    /// Transform every file in `files` and return once all of them are written.
    ///
    /// Under [`ErrorPolicy::Abort`] the first failure is returned after the
    /// work already under way has drained; files not yet written at that point
    /// stay untouched, so the tree may be left partially rewritten.
    pub async fn transform_files(
        &self,
        files: Vec<PathBuf>,
        config: &OperationConfig,
    ) -> Result<PipelineReport> {
        let operations = Arc::new(OperationIndex::new(config));
        let pool = WorkerPool::new(self.options.worker_count(), operations)?;
        info!(
            "Transforming {} file(s) with {} worker(s)",
            files.len(),
            pool.size()
        );

        let run = Arc::new(Run {
            store: Arc::clone(&self.store),
            hooks: Arc::clone(&self.hooks),
            packages: Arc::clone(&self.packages),
            pool,
            reads: TaskQueue::new("read", self.options.read_concurrency),
            writes: TaskQueue::new("write", self.options.write_concurrency),
            in_flight: Latch::new(),
            policy: self.options.error_policy,
            aborted: AtomicBool::new(false),
            counters: Counters::default(),
            first_error: Mutex::new(None),
            failures: Mutex::new(Vec::new()),
        });

        self.hooks.on_start(files.len());
        let file_count = files.len();
        for file_path in files {
            Run::schedule_read(&run, file_path);
        }

        run.settled().await;
        run.pool.shutdown().await?;

        let report = run.report(file_count);
        debug!("Pipeline settled: {report:?}");

        if self.options.error_policy == ErrorPolicy::Abort
            && let Some(error) = run
                .first_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        {
            return Err(error);
        }
        Ok(report)
    }
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicUsize,
    writes: AtomicUsize,
    written: AtomicUsize,
    unchanged: AtomicUsize,
}

/// State shared by the tasks of one run
struct Run {
    store: Arc<dyn FileStore>,
    hooks: Arc<dyn Hooks>,
    packages: Arc<FxHashMap<PathBuf, String>>,
    pool: WorkerPool,
    reads: TaskQueue,
    writes: TaskQueue,
    in_flight: Arc<Latch>,
    policy: ErrorPolicy,
    aborted: AtomicBool,
    counters: Counters,
    first_error: Mutex<Option<anyhow::Error>>,
    failures: Mutex<Vec<FileFailure>>,
}

impl Run {
    fn schedule_read(run: &Arc<Self>, file_path: PathBuf) {
        let task_run = Arc::clone(run);
        run.reads.spawn(async move {
            if task_run.is_aborted() {
                return;
            }
            let content = match task_run.store.read(&file_path).await {
                Ok(content) => content,
                Err(err) => {
                    task_run.fail(&file_path, err);
                    return;
                }
            };
            task_run.counters.reads.fetch_add(1, Ordering::AcqRel);

            // taken before this read task finishes, released by the write task
            let in_flight = task_run.in_flight.enter();
            let transform_run = Arc::clone(&task_run);
            tokio::spawn(transform_run.transform(file_path, content, in_flight));
        });
    }

    async fn transform(
        self: Arc<Self>,
        file_path: PathBuf,
        content: String,
        in_flight: LatchGuard,
    ) {
        let request = TransformRequest {
            package: self.packages.get(&file_path).cloned(),
            file_path: file_path.clone(),
            content,
        };
        match self.pool.run(request).await {
            Ok(result) => {
                self.hooks.on_file_complete(&result.file_path);
                Self::schedule_write(&self, result, in_flight);
            }
            Err(err) => self.fail(&file_path, err),
        }
    }

    fn schedule_write(run: &Arc<Self>, result: TransformResult, in_flight: LatchGuard) {
        let task_run = Arc::clone(run);
        run.writes.spawn(async move {
            let _in_flight = in_flight;
            if task_run.is_aborted() {
                return;
            }
            if result.changed {
                if let Err(err) = task_run
                    .store
                    .write(&result.file_path, &result.content)
                    .await
                {
                    task_run.fail(&result.file_path, err);
                    return;
                }
                task_run.counters.written.fetch_add(1, Ordering::AcqRel);
                debug!("Wrote {}", result.file_path.display());
            } else {
                task_run.counters.unchanged.fetch_add(1, Ordering::AcqRel);
            }
            task_run.counters.writes.fetch_add(1, Ordering::AcqRel);
        });
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn fail(&self, file_path: &Path, err: anyhow::Error) {
        match self.policy {
            ErrorPolicy::Abort => {
                if !self.aborted.swap(true, Ordering::AcqRel) {
                    error!("{err:#}");
                    *self
                        .first_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(err);
                } else {
                    debug!("Suppressed failure after abort: {err:#}");
                }
            }
            ErrorPolicy::Continue => {
                warn!("{err:#}");
                self.failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(FileFailure {
                        file_path: file_path.to_path_buf(),
                        message: format!("{err:#}"),
                    });
            }
        }
    }

    /// Wait until both queues are idle and no file is in flight.
    ///
    /// A file holds its in-flight guard before its read task ends and enters
    /// the write queue before releasing it, so observing the three conditions
    /// in this order, with no newer activity, means every file is done.
    async fn settled(&self) {
        loop {
            self.reads.on_idle().await;
            self.in_flight.wait_zero().await;
            self.writes.on_idle().await;

            if self.reads.is_idle() && self.in_flight.is_zero() && self.writes.is_idle() {
                return;
            }
        }
    }

    fn report(&self, files: usize) -> PipelineReport {
        PipelineReport {
            files,
            reads: self.counters.reads.load(Ordering::Acquire),
            writes: self.counters.writes.load(Ordering::Acquire),
            written: self.counters.written.load(Ordering::Acquire),
            unchanged: self.counters.unchanged.load(Ordering::Acquire),
            failures: std::mem::take(
                &mut *self.failures.lock().unwrap_or_else(PoisonError::into_inner),
            ),
        }
    }
}

/// Convenience entry point with default options, writing to the filesystem
pub async fn transform_files(
    files: Vec<PathBuf>,
    config: &OperationConfig,
    hooks: Arc<dyn Hooks>,
) -> Result<PipelineReport> {
    if files.is_empty() {
        warn!("No files to transform");
    }
    TransformExecutor::new(ExecutorOptions::default())
        .with_hooks(hooks)
        .transform_files(files, config)
        .await
}
