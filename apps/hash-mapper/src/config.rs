//! Centralized configuration for hash-mapper.
//!
//! CLI flags and environment variables are resolved and validated at startup to
//! fail fast on misconfiguration rather than partway through a run.

use std::fmt;
use std::path::PathBuf;

use clap::Parser;
use digests::Algorithm;
use domain::pipeline::{PipelineConfig, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_PROGRESS_INTERVAL};
use domain::validate::{parse_index_range, validate_table_name};
use domain::{IndexRange, TableName, DEFAULT_TABLE};
use num_bigint::BigUint;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "hash-mapper", version)]
#[command(about = "Enumerate every string over a charset and store its digest for reverse lookup")]
pub struct Args {
    /// File with the charset. Leading and trailing whitespace is ignored
    #[arg(short = 'c', long = "char-set", value_name = "FILE")]
    pub char_set: Option<PathBuf>,

    /// SQLite file where hashes are stored; created (and reset) if missing
    #[arg(short = 'd', long = "db-path", env = "DB_PATH", value_name = "FILE")]
    pub db_path: Option<PathBuf>,

    /// First index to enumerate (inclusive)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub min: String,

    /// Last index to enumerate (exclusive)
    #[arg(long, allow_hyphen_values = true)]
    pub max: String,

    /// Table receiving the records
    #[arg(short, long, default_value = DEFAULT_TABLE)]
    pub table: String,

    /// Digest algorithm: md5, sha1 or sha256
    #[arg(short, long, default_value = "md5")]
    pub algorithm: String,

    /// Drop and recreate the table before enumerating
    #[arg(short, long)]
    pub reset: bool,

    /// Storage backend: sqlite or memory
    #[arg(long, env = "STORAGE_PROVIDER", default_value = "sqlite")]
    pub storage: String,

    /// Log progress every N records
    #[arg(long, default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    pub progress_every: u64,

    /// Write the checkpoint every N records
    #[arg(long, default_value_t = DEFAULT_CHECKPOINT_INTERVAL)]
    pub checkpoint_every: u64,

    /// Log output format: pretty or json
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Largest range `--storage memory` accepts; that store keeps every record.
pub const MEMORY_MAX_RANGE: u64 = 10_000_000;

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on exit)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Run configuration. All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    pub charset_path: Option<PathBuf>,
    /// Required when `storage_provider` is `Sqlite`
    pub db_path: Option<PathBuf>,
    pub range: IndexRange,
    pub table: TableName,
    pub algorithm: Algorithm,
    pub reset: bool,
    pub storage_provider: StorageProvider,
    pub progress_interval: u64,
    pub checkpoint_interval: u64,
    pub log_format: LogFormat,
    pub json_report: bool,
}

impl Config {
    /// Validate parsed arguments.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let range = parse_index_range(&args.min, &args.max).map_err(|e| ConfigError {
            field: "--min/--max",
            message: e.to_string(),
        })?;

        let table = validate_table_name(&args.table).map_err(|e| ConfigError {
            field: "--table",
            message: e.to_string(),
        })?;

        let algorithm: Algorithm = args.algorithm.parse().map_err(|e: domain::CoreError| ConfigError {
            field: "--algorithm",
            message: e.to_string(),
        })?;

        let storage_provider = StorageProvider::parse(&args.storage).ok_or_else(|| ConfigError {
            field: "STORAGE_PROVIDER",
            message: format!("expected sqlite or memory, got {:?}", args.storage),
        })?;

        // Without a database file there is nothing to write to.
        let db_path = args.db_path.filter(|p| !p.as_os_str().is_empty());
        if storage_provider == StorageProvider::Sqlite && db_path.is_none() {
            return Err(ConfigError {
                field: "DB_PATH",
                message: "No database file provided. Pass --db-path or set DB_PATH".into(),
            });
        }

        if storage_provider == StorageProvider::Memory
            && range.len() > BigUint::from(MEMORY_MAX_RANGE)
        {
            return Err(ConfigError {
                field: "--max",
                message: format!(
                    "memory storage holds at most {MEMORY_MAX_RANGE} records; use sqlite for larger ranges"
                ),
            });
        }

        if args.progress_every == 0 {
            return Err(ConfigError {
                field: "--progress-every",
                message: "must be at least 1".into(),
            });
        }
        if args.checkpoint_every == 0 {
            return Err(ConfigError {
                field: "--checkpoint-every",
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            charset_path: args.char_set.filter(|p| !p.as_os_str().is_empty()),
            db_path,
            range,
            table,
            algorithm,
            reset: args.reset,
            storage_provider,
            progress_interval: args.progress_every,
            checkpoint_interval: args.checkpoint_every,
            log_format: LogFormat::from_str(&args.log_format),
            json_report: args.json,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            table: self.table.clone(),
            progress_interval: self.progress_interval,
            checkpoint_interval: self.checkpoint_interval,
        }
    }

    /// Log warnings about settings that lose work.
    pub fn warn_if_ephemeral(&self) {
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!(
                range = %self.range.len(),
                "STORAGE_PROVIDER=memory: every record is held in memory until exit, so memory use grows with the range and nothing is persisted."
            );
        }
        if self.reset {
            tracing::warn!(table = %self.table, "--reset: existing records in the table will be dropped");
        }
    }
}
