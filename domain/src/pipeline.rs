//! Resumable enumeration of an index range into a `HashStore`.
//!
//! For every index in `[start, end)` the pipeline encodes the index, digests the
//! resulting string and appends the record, one record at a time. Progress and
//! checkpoints are emitted at fixed cadences. A run resumes from the store's
//! checkpoint unless a reset is requested, and stops cooperatively when its stop
//! flag is raised.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use num_bigint::BigUint;
use serde::{Serialize, Serializer};

use crate::numeral::encode;
use crate::{
    Alphabet, CoreError, Digester, HashStore, IndexRange, Progress, ProgressObserver, Record,
    TableName,
};

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 500;
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 500;

/// Per-run settings. Zero intervals are treated as 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub table: TableName,
    pub progress_interval: u64,
    pub checkpoint_interval: u64,
}

impl PipelineConfig {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(TableName::default())
    }
}

fn as_decimal<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Outcome of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub table: String,
    pub algorithm: String,
    /// First index this run processed (after resuming).
    #[serde(serialize_with = "as_decimal")]
    pub start: BigUint,
    #[serde(serialize_with = "as_decimal")]
    pub end: BigUint,
    /// First index left unprocessed; equals `end` on completion.
    #[serde(serialize_with = "as_decimal")]
    pub next_index: BigUint,
    pub written: u64,
    pub resumed: bool,
    pub reset: bool,
    pub interrupted: bool,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.next_index >= self.end
    }
}

/// Errors that abort a run. Each carries enough context to restart safely.
#[derive(Debug)]
pub enum PipelineError {
    Range(String),
    InvalidAlphabet(String),
    AlphabetMismatch {
        table: String,
        stored: String,
        requested: String,
    },
    AlgorithmMismatch {
        table: String,
        stored: String,
        requested: String,
    },
    Encode {
        index: BigUint,
        source: CoreError,
    },
    Digest {
        index: BigUint,
        alphabet: String,
        source: CoreError,
    },
    Store {
        table: String,
        index: Option<BigUint>,
        source: CoreError,
    },
}

impl PipelineError {
    /// Index being processed when the run failed, if any.
    pub fn failed_index(&self) -> Option<&BigUint> {
        match self {
            PipelineError::Encode { index, .. } | PipelineError::Digest { index, .. } => {
                Some(index)
            }
            PipelineError::Store { index, .. } => index.as_ref(),
            _ => None,
        }
    }
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Range(msg) => write!(f, "invalid range: {}", msg),
            PipelineError::InvalidAlphabet(msg) => write!(f, "invalid alphabet: {}", msg),
            PipelineError::AlphabetMismatch {
                table,
                stored,
                requested,
            } => write!(
                f,
                "table {} was built with charset {:?}, not {:?}; reset it to change charset",
                table, stored, requested
            ),
            PipelineError::AlgorithmMismatch {
                table,
                stored,
                requested,
            } => write!(
                f,
                "table {} was built with {}, not {}; reset it to change algorithm",
                table, stored, requested
            ),
            PipelineError::Encode { index, source } => {
                write!(f, "encoding index {} failed: {}", index, source)
            }
            PipelineError::Digest {
                index,
                alphabet,
                source,
            } => write!(
                f,
                "digest of index {} (charset {:?}) failed: {}",
                index, alphabet, source
            ),
            PipelineError::Store {
                table,
                index: Some(index),
                source,
            } => write!(f, "table {} at index {}: {}", table, index, source),
            PipelineError::Store {
                table,
                index: None,
                source,
            } => write!(f, "table {}: {}", table, source),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Encode { source, .. }
            | PipelineError::Digest { source, .. }
            | PipelineError::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Drives the encode, digest and append steps over an index range.
///
/// Generic over the store and digester so tests can run it against the
/// in-memory store with a stub digest.
pub struct Enumerator<S: HashStore, D: Digester> {
    store: S,
    digester: D,
    config: PipelineConfig,
    progress: Option<Arc<dyn ProgressObserver>>,
    stop: Option<Arc<AtomicBool>>,
}

impl<S: HashStore, D: Digester> Enumerator<S, D> {
    pub fn new(store: S, digester: D, config: PipelineConfig) -> Self {
        Self {
            store,
            digester,
            config,
            progress: None,
            stop: None,
        }
    }

    pub fn with_progress(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Raising `flag` makes the run stop before its next index.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enumerate `range` over `alphabet`, resuming from the stored checkpoint
    /// unless `reset_requested` is set.
    pub fn run(
        &self,
        range: &IndexRange,
        alphabet: &Alphabet,
        reset_requested: bool,
    ) -> Result<RunReport, PipelineError> {
        if alphabet.is_empty() {
            return Err(PipelineError::InvalidAlphabet(
                "must have at least one symbol".into(),
            ));
        }
        let table = &self.config.table;
        let algorithm = self.digester.algorithm();

        let exists = self
            .store
            .table_exists(table)
            .map_err(|e| self.store_error(None, e))?;
        let reset = reset_requested || !exists;
        if reset {
            self.store
                .ensure_schema(table, alphabet, algorithm)
                .map_err(|e| self.store_error(None, e))?;
        }
        let (start, resumed) = if reset {
            (range.start().clone(), false)
        } else {
            self.resume_point(range, alphabet, algorithm)?
        };

        let mut report = RunReport {
            table: table.as_str().to_string(),
            algorithm: algorithm.to_string(),
            start: start.clone(),
            end: range.end().clone(),
            next_index: start.clone(),
            written: 0,
            resumed,
            reset,
            interrupted: false,
        };
        if &start >= range.end() {
            return Ok(report);
        }

        let progress_every = self.config.progress_interval.max(1);
        let checkpoint_every = self.config.checkpoint_interval.max(1);
        let mut index = start;
        let mut pending = 0u64;
        while &index < range.end() {
            if self.stop_requested() {
                report.interrupted = true;
                break;
            }
            self.process(table, alphabet, &index)?;
            report.written += 1;
            pending += 1;
            if report.written % progress_every == 0 {
                self.notify(table, &index, report.written);
            }
            index += 1u32;
            if pending >= checkpoint_every {
                self.checkpoint(table, &index)?;
                pending = 0;
            }
        }
        if pending > 0 {
            self.checkpoint(table, &index)?;
        }
        report.next_index = index;
        Ok(report)
    }

    fn resume_point(
        &self,
        range: &IndexRange,
        alphabet: &Alphabet,
        algorithm: &str,
    ) -> Result<(BigUint, bool), PipelineError> {
        let table = &self.config.table;
        let checkpoint = self
            .store
            .last_checkpoint(table)
            .map_err(|e| self.store_error(None, e))?;
        let requested = alphabet.as_string();
        if let Some(stored) = checkpoint.charset.filter(|c| *c != requested) {
            return Err(PipelineError::AlphabetMismatch {
                table: table.as_str().to_string(),
                stored,
                requested,
            });
        }
        if let Some(stored) = checkpoint.algorithm.filter(|a| a != algorithm) {
            return Err(PipelineError::AlgorithmMismatch {
                table: table.as_str().to_string(),
                stored,
                requested: algorithm.to_string(),
            });
        }
        if &checkpoint.next_index > range.start() {
            Ok((checkpoint.next_index, true))
        } else {
            Ok((range.start().clone(), false))
        }
    }

    fn process(
        &self,
        table: &TableName,
        alphabet: &Alphabet,
        index: &BigUint,
    ) -> Result<(), PipelineError> {
        let text = encode(index, alphabet).map_err(|source| PipelineError::Encode {
            index: index.clone(),
            source,
        })?;
        let digest = self
            .digester
            .digest(&text)
            .map_err(|source| PipelineError::Digest {
                index: index.clone(),
                alphabet: alphabet.as_string(),
                source,
            })?;
        let record = Record {
            index: index.clone(),
            text,
            digest,
        };
        self.store
            .append(table, &record)
            .map_err(|e| self.store_error(Some(index), e))
    }

    fn checkpoint(&self, table: &TableName, next_index: &BigUint) -> Result<(), PipelineError> {
        self.store
            .update_checkpoint(table, next_index)
            .map_err(|e| self.store_error(Some(next_index), e))
    }

    fn notify(&self, table: &TableName, index: &BigUint, processed: u64) {
        if let Some(observer) = &self.progress {
            observer.on_progress(&Progress {
                table,
                index,
                processed,
            });
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn store_error(&self, index: Option<&BigUint>, source: CoreError) -> PipelineError {
        PipelineError::Store {
            table: self.config.table.as_str().to_string(),
            index: index.cloned(),
            source,
        }
    }
}

/// Enumerate `[min, max)` into the default table with default cadences.
pub fn run<S: HashStore, D: Digester>(
    min: BigUint,
    max: BigUint,
    alphabet: &Alphabet,
    digester: D,
    store: S,
    reset_requested: bool,
) -> Result<RunReport, PipelineError> {
    let range = IndexRange::new(min, max).map_err(|e| match e {
        CoreError::Range(msg) => PipelineError::Range(msg),
        other => PipelineError::Range(other.to_string()),
    })?;
    Enumerator::new(store, digester, PipelineConfig::default()).run(
        &range,
        alphabet,
        reset_requested,
    )
}
