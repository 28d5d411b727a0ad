use std::path::Path;

/// Progress callbacks fired by the pipeline.
///
/// `on_start` fires once with the number of files before any work begins.
/// `on_file_complete` fires once per file when its transform has finished,
/// before the file is written.
pub trait Hooks: Send + Sync {
    fn on_start(&self, _file_count: usize) {}

    fn on_file_complete(&self, _file_path: &Path) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}
