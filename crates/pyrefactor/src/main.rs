use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use log::{LevelFilter, debug, error, info};
use pyrefactor::{
    config::Config,
    engine::{ExecuteOptions, ExecutionSummary, execute},
    operations::{MoveOperation, OperationConfig, RenameOperation},
    pipeline::{ErrorPolicy, Hooks},
};
use ruff_python_stdlib::identifiers::is_identifier;

/// Rename and move imported Python symbols across a source tree
#[derive(Parser, Debug)]
#[command(name = "pyrefactor", version, about, long_about = None)]
struct Cli {
    /// Module the symbols are imported from
    #[arg(short, long = "from", env = "PYREFACTOR_FROM", value_name = "MODULE")]
    from: Option<String>,

    /// Rename a symbol, given as `old,new` (repeatable)
    #[arg(short, long = "rename", value_name = "OLD,NEW", value_parser = parse_pair)]
    rename: Vec<(String, String)>,

    /// Move a symbol's import to another module, given as `name,module` (repeatable)
    #[arg(short, long = "move", value_name = "NAME,MODULE", value_parser = parse_pair)]
    moves: Vec<(String, String)>,

    /// TOML file with `[[rename]]` and `[[move]]` tables
    #[arg(long, value_name = "FILE")]
    operations: Option<PathBuf>,

    /// Source root to scan (repeatable, overrides configured roots)
    #[arg(long, value_name = "DIR")]
    src: Vec<PathBuf>,

    /// Configuration file applied over project and user configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report the files that would change without writing them
    #[arg(long)]
    dry_run: bool,

    /// What to do when a file fails
    #[arg(long, value_enum)]
    on_error: Option<ErrorPolicy>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Logs progress as files finish transforming
#[derive(Debug, Default)]
struct ProgressHooks {
    total: AtomicUsize,
    completed: AtomicUsize,
}

impl Hooks for ProgressHooks {
    fn on_start(&self, file_count: usize) {
        self.total.store(file_count, Ordering::Release);
        info!("Processing {file_count} file(s)");
    }

    fn on_file_complete(&self, file_path: &Path) {
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            "[{done}/{}] {}",
            self.total.load(Ordering::Acquire),
            file_path.display()
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(summary) if summary.report.failures.is_empty() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .init();
}

async fn run(cli: Cli) -> Result<ExecutionSummary> {
    let project_dir = std::env::current_dir().context("Failed to get current directory")?;
    let mut config = Config::load(&project_dir, cli.config.as_deref())?;
    if !cli.src.is_empty() {
        config.src = cli.src.clone();
    }
    if let Some(policy) = cli.on_error {
        config.on_error = policy;
    }
    config.validate()?;
    debug!("Effective configuration: {config:?}");

    let operations = collect_operations(&cli)?;
    let summary = execute(ExecuteOptions {
        operations,
        config,
        dry_run: cli.dry_run,
        hooks: Arc::new(ProgressHooks::default()),
    })
    .await?;

    report(&summary, cli.dry_run);
    Ok(summary)
}

/// Merge the operation file with the `--rename` and `--move` flags
fn collect_operations(cli: &Cli) -> Result<OperationConfig> {
    let mut operations = match &cli.operations {
        Some(path) => OperationConfig::load(path)?,
        None => OperationConfig::default(),
    };

    if !cli.rename.is_empty() || !cli.moves.is_empty() {
        let Some(from) = &cli.from else {
            bail!("--from is required with --rename or --move");
        };
        validate_module(from)?;

        for (old, new) in &cli.rename {
            validate_identifier(old)?;
            validate_identifier(new)?;
            operations
                .rename
                .push(RenameOperation::new(old.clone(), new.clone(), from.clone()));
        }
        for (name, to_module) in &cli.moves {
            validate_identifier(name)?;
            validate_module(to_module)?;
            operations
                .moves
                .push(MoveOperation::new(name.clone(), to_module.clone(), from.clone()));
        }
    }

    if operations.is_empty() {
        bail!("Nothing to do: pass --rename, --move or --operations");
    }
    Ok(operations)
}

fn report(summary: &ExecutionSummary, dry_run: bool) {
    let report = &summary.report;
    if dry_run {
        for path in &summary.would_write {
            info!("Would rewrite {}", path.display());
        }
        info!(
            "Dry run: {} of {} file(s) would change",
            summary.would_write.len(),
            report.files
        );
    } else {
        info!(
            "Processed {} file(s): {} rewritten, {} unchanged",
            report.files, report.written, report.unchanged
        );
    }
    for failure in &report.failures {
        error!("{}: {}", failure.file_path.display(), failure.message);
    }
}

fn parse_pair(value: &str) -> Result<(String, String), String> {
    let (left, right) = value
        .split_once(',')
        .ok_or_else(|| format!("expected two comma-separated values, got `{value}`"))?;
    let (left, right) = (left.trim(), right.trim());
    if left.is_empty() || right.is_empty() || right.contains(',') {
        return Err(format!(
            "expected two comma-separated values, got `{value}`"
        ));
    }
    Ok((left.to_string(), right.to_string()))
}

fn validate_identifier(name: &str) -> Result<()> {
    if !is_identifier(name) {
        bail!("`{name}` is not a valid Python identifier");
    }
    Ok(())
}

/// Absolute or relative dotted module path
fn validate_module(module: &str) -> Result<()> {
    let dotted = module.trim_start_matches('.');
    if dotted.is_empty() && !module.is_empty() {
        return Ok(());
    }
    if dotted.split('.').all(is_identifier) {
        Ok(())
    } else {
        bail!("`{module}` is not a valid Python module path")
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_pairs_are_split_on_comma() {
        assert_eq!(
            parse_pair("old_name, new_name"),
            Ok(("old_name".to_string(), "new_name".to_string()))
        );
        assert!(parse_pair("missing").is_err());
        assert!(parse_pair("a,b,c").is_err());
        assert!(parse_pair(",b").is_err());
    }

    #[test]
    fn test_operations_from_flags() {
        let cli = Cli::parse_from([
            "pyrefactor",
            "--from",
            "app.models",
            "-r",
            "User,Account",
            "--move",
            "User,app.accounts",
        ]);

        let operations = collect_operations(&cli).expect("operations should build");
        assert_eq!(
            operations.rename,
            vec![RenameOperation::new("User", "Account", "app.models")]
        );
        assert_eq!(
            operations.moves,
            vec![MoveOperation::new("User", "app.accounts", "app.models")]
        );
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        let cli = Cli::parse_from(["pyrefactor", "-f", "app", "-r", "User,not-valid"]);
        let error = collect_operations(&cli).expect_err("dash is not allowed");
        assert!(error.to_string().contains("not-valid"));

        let cli = Cli::parse_from(["pyrefactor", "-f", "app..models", "-r", "a,b"]);
        assert!(collect_operations(&cli).is_err());
    }

    #[test]
    fn test_from_is_required_with_flags() {
        let cli = Cli::try_parse_from(["pyrefactor", "-r", "a,b"]).expect("flags should parse");
        if cli.from.is_none() {
            assert!(collect_operations(&cli).is_err());
        }
    }

    #[test]
    fn test_module_paths() {
        assert!(validate_module("pkg.sub").is_ok());
        assert!(validate_module("..pkg").is_ok());
        assert!(validate_module(".").is_ok());
        assert!(validate_module("pkg.").is_err());
        assert!(validate_module("").is_err());
    }
}
