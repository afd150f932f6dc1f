//! Domain library for hash-mapper.
//!
//! Holds the numeral engine, the enumeration pipeline, the ports (traits) the
//! pipeline drives, and the error definitions. Keep adapters and IO concerns out
//! of this crate: digests and persistence live behind `Digester` and
//! `HashStore`.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use num_bigint::BigUint;

/// Table used when the caller does not name one.
pub const DEFAULT_TABLE: &str = "hashes";

/// Ordered set of distinct symbols. A symbol's position is its digit value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Alphabet(Vec<char>);

impl Alphabet {
    /// Build an alphabet from symbols in digit order. Rejects empty input and
    /// repeated symbols.
    pub fn new<I: IntoIterator<Item = char>>(symbols: I) -> Result<Self, CoreError> {
        let symbols: Vec<char> = symbols.into_iter().collect();
        if symbols.is_empty() {
            return Err(CoreError::InvalidAlphabet(
                "must have at least one symbol".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for c in &symbols {
            if !seen.insert(*c) {
                return Err(CoreError::InvalidAlphabet(format!("duplicate symbol {c:?}")));
            }
        }
        Ok(Self(symbols))
    }

    /// Normalise free text into an alphabet: surrounding whitespace is trimmed,
    /// duplicates dropped, and the remaining symbols sorted.
    pub fn from_text(text: &str) -> Result<Self, CoreError> {
        let unique: BTreeSet<char> = text.trim().chars().collect();
        Self::new(unique)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn symbols(&self) -> &[char] {
        &self.0
    }

    /// Digit value of `symbol`, if it belongs to the alphabet.
    pub fn digit_of(&self, symbol: char) -> Option<usize> {
        self.0.iter().position(|c| *c == symbol)
    }

    /// Symbols rendered in digit order; used as the alphabet's identity in
    /// stored checkpoints.
    pub fn as_string(&self) -> String {
        self.0.iter().collect()
    }
}

impl Display for Alphabet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Name of the table stores keep checkpoints in; not available as a hash table.
pub const CHECKPOINT_TABLE: &str = "checkpoints";

/// Name of a persisted hash table. Interpolated into SQL by the SQLite adapter,
/// so only identifiers are accepted. Names are lowercased: SQLite resolves
/// table names without regard to case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into().to_ascii_lowercase();
        if val.is_empty() {
            return Err(CoreError::InvalidTableName("empty".into()));
        }
        if val.len() > 64 {
            return Err(CoreError::InvalidTableName("longer than 64 characters".into()));
        }
        if val.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(CoreError::InvalidTableName("must not start with a digit".into()));
        }
        if !val.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(CoreError::InvalidTableName("invalid characters".into()));
        }
        if val.starts_with("sqlite_") {
            return Err(CoreError::InvalidTableName("sqlite_ prefix is reserved".into()));
        }
        if val == CHECKPOINT_TABLE {
            return Err(CoreError::InvalidTableName(format!("{CHECKPOINT_TABLE} is reserved")));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE.to_string())
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open index range `[start, end)` with `start < end`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRange {
    start: BigUint,
    end: BigUint,
}

impl IndexRange {
    pub fn new(start: BigUint, end: BigUint) -> Result<Self, CoreError> {
        if start >= end {
            return Err(CoreError::Range(format!(
                "min index {start} must be less than max index {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &BigUint {
        &self.start
    }

    pub fn end(&self) -> &BigUint {
        &self.end
    }

    /// Number of indices covered.
    pub fn len(&self) -> BigUint {
        &self.end - &self.start
    }
}

/// One enumerated entry: the index, the string it encodes to, and its digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub index: BigUint,
    pub text: String,
    pub digest: String,
}

/// Resume state of a table as reported by a store.
///
/// `next_index` is the first index not yet processed (zero when the table has
/// never been written). `charset` and `algorithm` are the values the table was
/// created with, when known.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub next_index: BigUint,
    pub charset: Option<String>,
    pub algorithm: Option<String>,
}

/// Digest function applied once per enumerated string.
pub trait Digester: Send + Sync {
    /// Short lowercase algorithm name, e.g. `md5`.
    fn algorithm(&self) -> &str;
    /// Hex digest of `input`. Must be deterministic.
    fn digest(&self, input: &str) -> Result<String, CoreError>;
}

/// Storage port for enumerated records and per-table checkpoints.
pub trait HashStore: Send + Sync {
    fn table_exists(&self, table: &TableName) -> Result<bool, CoreError>;
    /// (Re)create `table` empty, remember the alphabet and algorithm it is built
    /// with, and reset its checkpoint to zero. Calling it twice leaves the same
    /// state as calling it once.
    fn ensure_schema(
        &self,
        table: &TableName,
        alphabet: &Alphabet,
        algorithm: &str,
    ) -> Result<(), CoreError>;
    fn last_checkpoint(&self, table: &TableName) -> Result<Checkpoint, CoreError>;
    /// Persist one record. A text already present in the table is
    /// `CoreError::AlreadyExists`.
    fn append(&self, table: &TableName, record: &Record) -> Result<(), CoreError>;
    fn update_checkpoint(&self, table: &TableName, next_index: &BigUint)
        -> Result<(), CoreError>;
    /// Number of records stored in `table`.
    fn count(&self, table: &TableName) -> Result<u64, CoreError>;
}

/// Snapshot handed to a `ProgressObserver`.
#[derive(Debug)]
pub struct Progress<'a> {
    pub table: &'a TableName,
    /// Last index processed.
    pub index: &'a BigUint,
    /// Records written so far in this run.
    pub processed: u64,
}

/// Receives periodic progress notifications from the pipeline.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: &Progress<'_>);
}

impl<D: Digester + ?Sized> Digester for Box<D> {
    fn algorithm(&self) -> &str {
        (**self).algorithm()
    }

    fn digest(&self, input: &str) -> Result<String, CoreError> {
        (**self).digest(input)
    }
}

impl<D: Digester + ?Sized> Digester for &D {
    fn algorithm(&self) -> &str {
        (**self).algorithm()
    }

    fn digest(&self, input: &str) -> Result<String, CoreError> {
        (**self).digest(input)
    }
}

macro_rules! forward_hash_store {
    ($($ty:ty),*) => {$(
        impl<S: HashStore + ?Sized> HashStore for $ty {
            fn table_exists(&self, table: &TableName) -> Result<bool, CoreError> {
                (**self).table_exists(table)
            }

            fn ensure_schema(
                &self,
                table: &TableName,
                alphabet: &Alphabet,
                algorithm: &str,
            ) -> Result<(), CoreError> {
                (**self).ensure_schema(table, alphabet, algorithm)
            }

            fn last_checkpoint(&self, table: &TableName) -> Result<Checkpoint, CoreError> {
                (**self).last_checkpoint(table)
            }

            fn append(&self, table: &TableName, record: &Record) -> Result<(), CoreError> {
                (**self).append(table, record)
            }

            fn update_checkpoint(
                &self,
                table: &TableName,
                next_index: &BigUint,
            ) -> Result<(), CoreError> {
                (**self).update_checkpoint(table, next_index)
            }

            fn count(&self, table: &TableName) -> Result<u64, CoreError> {
                (**self).count(table)
            }
        }
    )*};
}

forward_hash_store!(&S, Box<S>, Arc<S>);

/// Core domain errors (no external error crates to keep deps minimal).
#[derive(Debug)]
pub enum CoreError {
    InvalidAlphabet(String),
    InvalidEncoding(String),
    InvalidTableName(String),
    Range(String),
    AlreadyExists,
    Store(String),
    Digest(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidAlphabet(msg) => write!(f, "invalid alphabet: {}", msg),
            CoreError::InvalidEncoding(msg) => write!(f, "invalid encoding: {}", msg),
            CoreError::InvalidTableName(msg) => write!(f, "invalid table name: {}", msg),
            CoreError::Range(msg) => write!(f, "invalid range: {}", msg),
            CoreError::AlreadyExists => write!(f, "record already exists"),
            CoreError::Store(msg) => write!(f, "store error: {}", msg),
            CoreError::Digest(msg) => write!(f, "digest error: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - numeral engine loaded", pkg, ver)
}

pub mod adapters;
pub mod numeral;
pub mod pipeline;
pub mod validate;
