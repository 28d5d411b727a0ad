//! Layered configuration.
//!
//! Sources, lowest precedence first: built-in defaults, the user config file
//! (`pyrefactor/pyrefactor.toml` in the platform config directory), the
//! project's `pyrefactor.toml` or `[tool.pyrefactor]` table in
//! `pyproject.toml`, an explicit `--config` file, `PYREFACTOR_*` environment
//! variables, and finally command-line flags applied by the binary.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use etcetera::{BaseStrategy, choose_base_strategy};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::pipeline::{
    DEFAULT_READ_CONCURRENCY, DEFAULT_WRITE_CONCURRENCY, ErrorPolicy, ExecutorOptions,
};

pub const PROJECT_CONFIG_FILE: &str = "pyrefactor.toml";
pub const PYPROJECT_FILE: &str = "pyproject.toml";

const ENV_SRC: &str = "PYREFACTOR_SRC";
const ENV_READ_CONCURRENCY: &str = "PYREFACTOR_READ_CONCURRENCY";
const ENV_WRITE_CONCURRENCY: &str = "PYREFACTOR_WRITE_CONCURRENCY";
const ENV_WORKERS: &str = "PYREFACTOR_WORKERS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Source roots scanned for modules
    pub src: Vec<PathBuf>,
    /// Glob patterns, relative to each root, of paths to skip
    pub exclude: Vec<String>,
    pub read_concurrency: usize,
    pub write_concurrency: usize,
    /// Worker threads, defaults to the available parallelism
    pub workers: Option<usize>,
    pub on_error: ErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            src: vec![PathBuf::from(".")],
            exclude: Vec::new(),
            read_concurrency: DEFAULT_READ_CONCURRENCY,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            workers: None,
            on_error: ErrorPolicy::default(),
        }
    }
}

/// One configuration source; unset keys leave lower layers in place
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigLayer {
    src: Option<Vec<PathBuf>>,
    exclude: Option<Vec<String>>,
    read_concurrency: Option<usize>,
    write_concurrency: Option<usize>,
    workers: Option<usize>,
    on_error: Option<ErrorPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct PyProject {
    #[serde(default)]
    tool: PyProjectTools,
}

#[derive(Debug, Default, Deserialize)]
struct PyProjectTools {
    pyrefactor: Option<ConfigLayer>,
}

impl Config {
    /// Load every file and environment layer for a project rooted at `project_dir`
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = user_config_path()
            && path.is_file()
        {
            debug!("Loading user config from {}", path.display());
            config.apply_file(&path)?;
        }

        let project_config = project_dir.join(PROJECT_CONFIG_FILE);
        let pyproject = project_dir.join(PYPROJECT_FILE);
        if project_config.is_file() {
            debug!("Loading project config from {}", project_config.display());
            config.apply_file(&project_config)?;
        } else if pyproject.is_file() {
            config.apply_pyproject(&pyproject)?;
        }

        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            config.apply_file(path)?;
        }

        config.apply_env_from(|key| std::env::var_os(key))?;
        config.validate()?;
        Ok(config)
    }

    /// Options for the transform pipeline
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            read_concurrency: self.read_concurrency,
            write_concurrency: self.write_concurrency,
            workers: self.workers,
            error_policy: self.on_error,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.src.is_empty() {
            bail!("At least one source root is required");
        }
        if self.read_concurrency == 0 || self.write_concurrency == 0 {
            bail!("Read and write concurrency must be at least 1");
        }
        if self.workers == Some(0) {
            bail!("Worker count must be at least 1");
        }
        Ok(())
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let layer: ConfigLayer = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        self.apply(layer, path.parent());
        Ok(())
    }

    fn apply_pyproject(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let pyproject: PyProject = toml::from_str(&content)
            .with_context(|| format!("Invalid [tool.pyrefactor] table in {}", path.display()))?;
        if let Some(layer) = pyproject.tool.pyrefactor {
            debug!("Loading [tool.pyrefactor] from {}", path.display());
            self.apply(layer, path.parent());
        }
        Ok(())
    }

    /// Merge a layer; relative source roots resolve against `base`
    fn apply(&mut self, layer: ConfigLayer, base: Option<&Path>) {
        if let Some(src) = layer.src {
            self.src = src
                .into_iter()
                .map(|root| match base {
                    Some(base) if root.is_relative() => base.join(root),
                    _ => root,
                })
                .collect();
        }
        if let Some(exclude) = layer.exclude {
            self.exclude = exclude;
        }
        if let Some(value) = layer.read_concurrency {
            self.read_concurrency = value;
        }
        if let Some(value) = layer.write_concurrency {
            self.write_concurrency = value;
        }
        if let Some(value) = layer.workers {
            self.workers = Some(value);
        }
        if let Some(value) = layer.on_error {
            self.on_error = value;
        }
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Result<()> {
        if let Some(src) = lookup(ENV_SRC).filter(|value| !value.is_empty()) {
            self.src = std::env::split_paths(&src).collect();
        }
        if let Some(value) = parse_env_count(&lookup, ENV_READ_CONCURRENCY)? {
            self.read_concurrency = value;
        }
        if let Some(value) = parse_env_count(&lookup, ENV_WRITE_CONCURRENCY)? {
            self.write_concurrency = value;
        }
        if let Some(value) = parse_env_count(&lookup, ENV_WORKERS)? {
            self.workers = Some(value);
        }
        Ok(())
    }
}

fn parse_env_count(
    lookup: &impl Fn(&str) -> Option<OsString>,
    key: &str,
) -> Result<Option<usize>> {
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .with_context(|| format!("{key} is not valid UTF-8"))?;
    let count = value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got `{value}`"))?;
    Ok(Some(count))
}

/// `pyrefactor/pyrefactor.toml` under the platform config directory
pub fn user_config_path() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("pyrefactor").join(PROJECT_CONFIG_FILE))
}
