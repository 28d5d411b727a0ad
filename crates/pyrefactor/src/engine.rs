//! Run orchestration: find the consumers of the targeted modules, then feed
//! them through the transform pipeline.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use indexmap::IndexSet;
use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::{
    config::Config,
    operations::OperationConfig,
    pipeline::{DryRunStore, FsStore, Hooks, PipelineReport, TransformExecutor},
    project_graph::ProjectGraph,
};

pub struct ExecuteOptions {
    pub operations: OperationConfig,
    pub config: Config,
    /// Report what would change without writing
    pub dry_run: bool,
    pub hooks: Arc<dyn Hooks>,
}

impl std::fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("operations", &self.operations)
            .field("config", &self.config)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Files handed to the pipeline
    pub files: Vec<PathBuf>,
    pub report: PipelineReport,
    /// Files a dry run would have written
    pub would_write: Vec<PathBuf>,
}

/// Modules named by the operation set, in first-seen order
pub fn target_modules(operations: &OperationConfig) -> IndexSet<&str> {
    operations
        .rename
        .iter()
        .map(|op| op.module_target.as_str())
        .chain(operations.moves.iter().map(|op| op.module_target.as_str()))
        .collect()
}

/// Apply `options.operations` to every file consuming one of their modules.
///
/// Unknown modules fail the run before any file is read.
pub async fn execute(options: ExecuteOptions) -> Result<ExecutionSummary> {
    let ExecuteOptions {
        operations,
        config,
        dry_run,
        hooks,
    } = options;

    if operations.is_empty() {
        bail!("No rename or move operations given");
    }
    config.validate()?;

    let roots = config.src.clone();
    let exclude = config.exclude.clone();
    let graph = tokio::task::spawn_blocking(move || ProjectGraph::discover(&roots, &exclude))
        .await
        .context("Project discovery task failed")??;
    info!("Project graph has {} module(s)", graph.module_count());

    let mut files = IndexSet::new();
    for module in target_modules(&operations) {
        let consumers = graph
            .consumers_of(module)
            .with_context(|| format!("Cannot apply operations for `{module}`"))?;
        debug!("`{module}` has {} consumer file(s)", consumers.len());
        files.extend(consumers);
    }
    let mut files: Vec<PathBuf> = files.into_iter().collect();
    files.sort();
    let packages: FxHashMap<PathBuf, String> = files
        .iter()
        .filter_map(|path| {
            graph
                .package_of(path)
                .map(|package| (path.clone(), package.to_string()))
        })
        .collect();

    let executor = TransformExecutor::new(config.executor_options())
        .with_hooks(hooks)
        .with_packages(packages);
    if dry_run {
        let store = Arc::new(DryRunStore::new());
        let report = executor
            .with_store(store.clone())
            .transform_files(files.clone(), &operations)
            .await?;
        let mut would_write = store.would_write();
        would_write.sort();
        return Ok(ExecutionSummary {
            files,
            report,
            would_write,
        });
    }

    let report = executor
        .with_store(Arc::new(FsStore))
        .transform_files(files.clone(), &operations)
        .await?;
    Ok(ExecutionSummary {
        files,
        report,
        would_write: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::operations::{MoveOperation, RenameOperation};

    #[test]
    fn test_target_modules_are_deduplicated_in_order() {
        let operations = OperationConfig {
            rename: vec![
                RenameOperation::new("a", "b", "pkg.one"),
                RenameOperation::new("c", "d", "pkg.two"),
            ],
            moves: vec![MoveOperation::new("e", "pkg.three", "pkg.one")],
        };

        let modules: Vec<&str> = target_modules(&operations).into_iter().collect();
        assert_eq!(modules, vec!["pkg.one", "pkg.two"]);
    }
}
