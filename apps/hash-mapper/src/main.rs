//! hash-mapper — precompute a plaintext -> digest lookup table.
//!
//! Enumerates every string over a charset in index order, hashes each one and
//! stores `(index, text, digest)` rows for later reverse lookup. Runs resume
//! from the table's checkpoint; Ctrl-C stops after the current index and
//! saves the checkpoint.
//!
//! Run:
//! ```bash
//! # first 100k strings over the default charset, md5
//! cargo run -p hash-mapper -- --db-path ./data/hashes.db --max 100000
//!
//! # custom charset, sha1, separate table, start over
//! cargo run -p hash-mapper -- -c charset.txt -d ./data/hashes.db -t words -a sha1 -r --max 1000000
//! ```
//!
//! Configuration: See `config.rs` for all flags and environment variables.

mod charset;
mod config;
mod error;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use domain::adapters::memory_store::InMemoryStore;
use domain::pipeline::{Enumerator, RunReport};
use domain::{HashStore, Progress, ProgressObserver};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Args, Config, StorageProvider};
use crate::error::AppError;

/// Logs pipeline progress through `tracing`.
struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, progress: &Progress<'_>) {
        info!(
            table = %progress.table,
            index = %progress.index,
            processed = progress.processed,
            "progress"
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cfg = match Config::from_args(Args::parse()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(&cfg);
    info!("{}", domain::about());
    cfg.warn_if_ephemeral();

    let json_report = cfg.json_report;
    match run(cfg).await {
        Ok(report) => {
            if json_report {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        error!(err = %AppError::from(e), "report error");
                        return ExitCode::FAILURE;
                    }
                }
            }
            if report.interrupted {
                ExitCode::from(130)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(AppError::Pipeline(e)) => {
            match e.failed_index() {
                Some(index) => error!(err = %e, %index, "run failed; rerun to resume"),
                None => error!(err = %e, "run failed"),
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(err = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is reserved for the --json report
    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

/// Resolve the charset and store, then drive the pipeline on a blocking worker
/// while this task listens for Ctrl-C.
async fn run(cfg: Config) -> Result<RunReport, AppError> {
    let alphabet = charset::load(cfg.charset_path.as_deref())?;
    info!(size = alphabet.len(), charset = %alphabet, "charset loaded");

    let (store, fresh) = build_store(&cfg)?;
    let reset = cfg.reset || fresh;
    let stop = Arc::new(AtomicBool::new(false));
    let enumerator = Enumerator::new(store, cfg.algorithm.digester(), cfg.pipeline_config())
        .with_progress(Arc::new(LogProgress))
        .with_stop_flag(stop.clone());
    info!(
        table = %enumerator.config().table,
        algorithm = %cfg.algorithm,
        min = %cfg.range.start(),
        max = %cfg.range.end(),
        reset,
        "starting enumeration"
    );

    let range = cfg.range.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        let report = enumerator.run(&range, &alphabet, reset)?;
        Ok::<_, AppError>((report, enumerator))
    });
    let (report, enumerator) = tokio::select! {
        joined = &mut task => joined??,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    warn!("interrupt received, stopping after the current index");
                    stop.store(true, Ordering::Relaxed);
                }
                Err(e) => warn!(err = %e, "cannot listen for Ctrl-C"),
            }
            task.await??
        }
    };

    if report.resumed {
        info!(from = %report.start, "resumed from checkpoint");
    }
    let total = enumerator.store().count(&enumerator.config().table)?;
    info!(
        written = report.written,
        next = %report.next_index,
        total,
        complete = report.is_complete(),
        interrupted = report.interrupted,
        "run finished"
    );
    Ok(report)
}

/// Construct the configured store. The flag is true when the store starts
/// empty, which forces a table reset.
fn build_store(cfg: &Config) -> Result<(Box<dyn HashStore>, bool), AppError> {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        StorageProvider::Sqlite => {
            let path = cfg.db_path.as_ref().ok_or_else(|| config::ConfigError {
                field: "DB_PATH",
                message: "No database file provided.".into(),
            })?;
            let fresh = !path.exists();
            if fresh {
                info!(path = %path.display(), "will create new database file");
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir).map_err(|e| {
                        domain::CoreError::Store(format!("creating {}: {e}", dir.display()))
                    })?;
                }
            }
            let store: Box<dyn HashStore> = Box::new(sqlite_adapter::SqliteStore::new(path)?);
            Ok((store, fresh))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageProvider::Sqlite => Err(config::ConfigError {
            field: "STORAGE_PROVIDER",
            message: "built without the sqlite feature".into(),
        }
        .into()),
        StorageProvider::Memory => {
            let store: Box<dyn HashStore> = Box::new(InMemoryStore::new());
            Ok((store, true))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &[&str]) -> Config {
        let mut argv = vec!["hash-mapper", "--progress-every", "2", "--checkpoint-every", "3"];
        argv.extend_from_slice(extra);
        Config::from_args(Args::try_parse_from(argv).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn memory_run_completes_range() {
        let cfg = config(&["--storage", "memory", "--max", "7"]);
        let report = run(cfg).await.unwrap();
        assert_eq!(report.written, 7);
        assert!(report.reset);
        assert!(report.is_complete());
        assert_eq!(report.algorithm, "md5");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_run_resumes_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("hashes.db");
        let db = db.to_str().unwrap();
        let set = dir.path().join("set.txt");
        std::fs::write(&set, "cab\n").unwrap();
        let set = set.to_str().unwrap();

        let first = run(config(&["--storage", "sqlite", "-d", db, "-c", set, "--max", "5"]))
            .await
            .unwrap();
        assert_eq!(first.written, 5);
        assert!(first.reset, "new database file forces a reset");

        let second = run(config(&["--storage", "sqlite", "-d", db, "-c", set, "--max", "9"]))
            .await
            .unwrap();
        assert!(second.resumed);
        assert_eq!(second.start.to_string(), "5");
        assert_eq!(second.written, 4);

        let again = run(config(&["--storage", "sqlite", "-d", db, "-c", set, "--max", "9"]))
            .await
            .unwrap();
        assert_eq!(again.written, 0);

        let store = sqlite_adapter::SqliteStore::new(db).unwrap();
        assert_eq!(store.count(&domain::TableName::default()).unwrap(), 9);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn changing_algorithm_without_reset_fails() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("h.db");
        let db = db.to_str().unwrap();
        run(config(&["--storage", "sqlite", "-d", db, "--max", "3"])).await.unwrap();

        let err = run(config(&["--storage", "sqlite", "-d", db, "-a", "sha1", "--max", "6"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Pipeline(domain::pipeline::PipelineError::AlgorithmMismatch { .. })
        ));

        let ok = run(config(&["--storage", "sqlite", "-d", db, "-a", "sha1", "-r", "--max", "6"]))
            .await
            .unwrap();
        assert_eq!(ok.written, 6);
    }
}
