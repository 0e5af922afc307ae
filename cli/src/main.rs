//! syncheck CLI - runs configured external checkers over files.
//!
//! ```text
//! main() -> load config -> FsHost + CheckerRegistry -> check_files()
//!                                                         |
//!                                          print report, exit status
//!                                                         |
//!                                             --watch: watch() until Ctrl-C
//! ```
//!
//! One-shot mode checks each file in turn and waits for every eligible
//! checker to finish before moving on; the per-checker debounce would
//! otherwise coalesce all files into a single run of the last one.

mod host;
mod report;

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{self, Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use clap::Parser;
use syncheck_checker::{CheckerRegistry, CheckerSettings};
use syncheck_config::SyncheckConfig;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::host::FsHost;
use crate::report::Collected;

/// How often watch mode looks at file modification times.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Exit status after Ctrl-C, as shells report SIGINT.
const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser)]
#[command(name = "syncheck", version)]
#[command(about = "Run external syntax checkers over files and report their diagnostics")]
struct Cli {
    /// Configuration file (default: $SYNCHECK_CONFIG or ~/.syncheck/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Working directory for checkers and base for relative paths they print
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Language id for every file (default: the file extension)
    #[arg(long, value_name = "ID")]
    language: Option<String>,

    /// Keep running and re-check files when they or the configuration change
    #[arg(long)]
    watch: bool,

    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

/// Used when `RUST_LOG` is unset: run lifecycle from the engine, warnings
/// from everything else.
const DEFAULT_LOG_FILTER: &str = "warn,syncheck=info,syncheck_checker=info";

struct LogFile {
    path: PathBuf,
    file: fs::File,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (log_file, failures) = open_log_file(&log_file_candidates());
    let Some(LogFile { path, file }) = log_file else {
        // stdout carries the report and stderr the progress; with no log
        // file, tracing output is dropped.
        tracing_subscriber::registry().with(env_filter).init();
        return;
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(env_filter)
        .init();
    tracing::info!(path = %path.display(), "Logging initialized");
    for failure in failures {
        tracing::warn!("Skipped log location: {failure}");
    }
}

/// First candidate that can be opened for appending, plus why earlier
/// candidates were skipped.
fn open_log_file(candidates: &[PathBuf]) -> (Option<LogFile>, Vec<String>) {
    let mut failures = Vec::new();
    for path in candidates {
        match append_to(path) {
            Ok(file) => {
                return (
                    Some(LogFile {
                        path: path.clone(),
                        file,
                    }),
                    failures,
                );
            }
            Err(e) => failures.push(format!("{}: {e}", path.display())),
        }
    }
    (None, failures)
}

fn append_to(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// `~/.syncheck/logs/syncheck.log`, then `./.syncheck/logs/syncheck.log`.
fn log_file_candidates() -> Vec<PathBuf> {
    let relative = Path::new("logs").join("syncheck.log");
    syncheck_config::data_dir()
        .into_iter()
        .chain(std::iter::once(PathBuf::from(".syncheck")))
        .map(|dir| dir.join(&relative))
        .collect()
}

fn load_settings(explicit: Option<&Path>) -> Result<CheckerSettings> {
    let config = match explicit {
        Some(path) => Some(SyncheckConfig::load_from(path)?),
        None => SyncheckConfig::load()?,
    };
    Ok(config
        .map(SyncheckConfig::into_settings)
        .unwrap_or_default())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref())?;
    let config_file = cli.config.clone().or_else(syncheck_config::config_path);

    let root = path::absolute(cli.root.as_deref().unwrap_or(Path::new(".")))
        .context("failed to resolve workspace root")?;
    let files = cli
        .files
        .iter()
        .map(|file| path::absolute(file).with_context(|| format!("bad path {}", file.display())))
        .collect::<Result<Vec<_>>>()?;

    let host = Arc::new(FsHost::new(root, cli.language.clone()));
    let mut registry = CheckerRegistry::start(&settings, Arc::clone(&host));
    if registry.checkers().is_empty() {
        eprintln!("warning: no checkers configured");
    }

    let collected = tokio::select! {
        result = check_files(&mut registry, &host, &files) => result?,
        _ = tokio::signal::ctrl_c() => {
            registry.shutdown().await;
            return Ok(ExitCode::from(INTERRUPTED_EXIT));
        }
    };

    let summary = report::print_all(&collected, &host);

    if cli.watch {
        watch(&mut registry, &host, &files, config_file.as_deref()).await?;
        registry.shutdown().await;
        return Ok(ExitCode::SUCCESS);
    }

    registry.shutdown().await;
    Ok(if summary.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Check each file in order, waiting for its runs to finish.
///
/// Results are copied out after every file because the next run clears its
/// checker's collection.
async fn check_files(
    registry: &mut CheckerRegistry<FsHost>,
    host: &FsHost,
    files: &[PathBuf],
) -> Result<Collected> {
    let mut collected = Collected::default();
    for path in files {
        let language = host.language_for(path);
        let pending = pending_runs(registry, &language);
        if pending.is_empty() {
            eprintln!(
                "{}: no checker handles language '{language}'",
                path.display()
            );
            continue;
        }
        host.open(path).await?;
        wait_until_settled(registry, pending).await?;
        collected.absorb(host);
    }
    Ok(collected)
}

/// Outstanding runs per checker name for one document.
fn pending_runs(registry: &CheckerRegistry<FsHost>, language_id: &str) -> HashMap<String, usize> {
    let mut pending = HashMap::new();
    for checker in registry.checkers() {
        if checker.config().handles(language_id) {
            *pending.entry(checker.name().to_string()).or_insert(0) += 1;
        }
    }
    pending
}

async fn wait_until_settled(
    registry: &mut CheckerRegistry<FsHost>,
    mut pending: HashMap<String, usize>,
) -> Result<()> {
    while !pending.is_empty() {
        let Some(event) = registry.next_event().await else {
            bail!("checker event channel closed");
        };
        if !event.is_terminal() {
            continue;
        }
        if let Some(remaining) = pending.get_mut(event.checker()) {
            *remaining -= 1;
            if *remaining == 0 {
                pending.remove(event.checker());
            }
        }
    }
    Ok(())
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .ok()
}

/// Re-check files as they change and rebuild checkers when the
/// configuration changes, until Ctrl-C.
async fn watch(
    registry: &mut CheckerRegistry<FsHost>,
    host: &FsHost,
    files: &[PathBuf],
    config_file: Option<&Path>,
) -> Result<()> {
    let mut file_stamps = Vec::with_capacity(files.len());
    for path in files {
        file_stamps.push(modified(path).await);
    }
    let mut config_stamp = match config_file {
        Some(path) => modified(path).await,
        None => None,
    };

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    eprintln!("watching {} file(s); press Ctrl-C to stop", files.len());

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for Ctrl-C")?;
                break;
            }
            _ = ticker.tick() => {
                if let Some(path) = config_file {
                    let stamp = modified(path).await;
                    if stamp != config_stamp {
                        config_stamp = stamp;
                        reload_config(registry, host, files, path).await;
                    }
                }
                for (path, stamp) in files.iter().zip(file_stamps.iter_mut()) {
                    let current = modified(path).await;
                    if current == *stamp {
                        continue;
                    }
                    *stamp = current;
                    if let Err(e) = host.reload(path).await {
                        eprintln!("warning: {e:#}");
                    }
                }
            }
            Some(event) = registry.next_event() => report::print_event(host, &event),
        }
    }
    Ok(())
}

/// Rebuild every checker from the configuration file and re-check all files.
///
/// A configuration that fails to load leaves the running checkers in place.
async fn reload_config(
    registry: &mut CheckerRegistry<FsHost>,
    host: &FsHost,
    files: &[PathBuf],
    config_file: &Path,
) {
    let settings = match SyncheckConfig::load_from(config_file) {
        Ok(config) => config.into_settings(),
        Err(e) => {
            eprintln!("warning: keeping previous configuration: {e}");
            return;
        }
    };
    registry.reload(&settings).await;
    eprintln!(
        "configuration reloaded: {} checker(s)",
        registry.checkers().len()
    );
    for path in files {
        if let Err(e) = host.reload(path).await {
            eprintln!("warning: {e:#}");
        }
    }
}
