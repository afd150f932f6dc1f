//! sqlite-adapter — SQLite implementation of the `HashStore` port.
//!
//! Purpose
//! - Persist enumerated `(index, text, digest)` records in one table per
//!   `TableName`, so a finished table can be queried by digest later.
//! - Keep a `checkpoints` meta table with the next index to process and the
//!   charset/algorithm each table was built with.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Big-integer indices are stored as decimal TEXT.
//! - `last_checkpoint` also looks at the last appended row, so a checkpoint
//!   written less often than records never causes a duplicate on resume.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{Alphabet, Checkpoint, CoreError, HashStore, Record, TableName};
use num_bigint::BigUint;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

/// SQLite-backed hash store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path and ensure the meta
    /// schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path.as_ref()).map_err(map_sqerr)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(map_sqerr)?;
        conn.pragma_update(None, "synchronous", "NORMAL").map_err(map_sqerr)?;
        init_schema(&conn)?;
        debug!(path = %path.as_ref().display(), "sqlite store opened");
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CoreError> {
        self.conn.lock().map_err(|_| CoreError::Store("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            table_name TEXT PRIMARY KEY,
            charset TEXT NOT NULL,
            algorithm TEXT NOT NULL,
            next_index TEXT NOT NULL DEFAULT '0',
            updated_at INTEGER NOT NULL
        );
        "#
    ).map_err(map_sqerr)?;
    Ok(())
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError { CoreError::Store(format!("sqlite error: {e}")) }

fn system_time_to_secs(t: SystemTime) -> u64 { t.duration_since(UNIX_EPOCH).unwrap_or(Duration::from_secs(0)).as_secs() }

fn parse_index(raw: &str) -> Result<BigUint, CoreError> {
    raw.parse::<BigUint>().map_err(|e| CoreError::Store(format!("bad index {raw:?} in db: {e}")))
}

fn table_exists(conn: &Connection, table: &TableName) -> Result<bool, CoreError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table.as_str()],
        |row| row.get(0),
    ).map_err(map_sqerr)?;
    Ok(n > 0)
}

impl HashStore for SqliteStore {
    fn table_exists(&self, table: &TableName) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        table_exists(&conn, table)
    }

    fn ensure_schema(&self, table: &TableName, alphabet: &Alphabet, algorithm: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        // Table names are validated identifiers, safe to interpolate.
        let t = table.as_str();
        tx.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS "{t}";
            CREATE TABLE "{t}" (
                idx TEXT NOT NULL,
                text TEXT NOT NULL UNIQUE,
                digest TEXT NOT NULL,
                PRIMARY KEY(text)
            );
            CREATE INDEX "idx_{t}_digest" ON "{t}"(digest);
            "#
        )).map_err(map_sqerr)?;
        tx.execute(
            "INSERT OR REPLACE INTO checkpoints(table_name, charset, algorithm, next_index, updated_at) VALUES (?1, ?2, ?3, '0', ?4)",
            params![t, alphabet.as_string(), algorithm, system_time_to_secs(SystemTime::now()) as i64],
        ).map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)?;
        info!(table = t, charset_len = alphabet.len(), algorithm, "table initialized");
        Ok(())
    }

    fn last_checkpoint(&self, table: &TableName) -> Result<Checkpoint, CoreError> {
        let conn = self.lock()?;
        let meta: Option<(String, String, String)> = conn.query_row(
            "SELECT charset, algorithm, next_index FROM checkpoints WHERE table_name = ?1",
            params![table.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        ).optional().map_err(map_sqerr)?;

        let mut checkpoint = Checkpoint::default();
        if let Some((charset, algorithm, next_index)) = meta {
            checkpoint.next_index = parse_index(&next_index)?;
            checkpoint.charset = Some(charset);
            checkpoint.algorithm = Some(algorithm);
        }
        if !table_exists(&conn, table)? {
            return Ok(checkpoint);
        }
        // Rows are appended in ascending index order, so the newest rowid holds
        // the highest index.
        let last: Option<String> = conn.query_row(
            &format!(r#"SELECT idx FROM "{}" ORDER BY rowid DESC LIMIT 1"#, table.as_str()),
            [],
            |row| row.get(0),
        ).optional().map_err(map_sqerr)?;
        if let Some(last) = last {
            let after_last = parse_index(&last)? + 1u32;
            if after_last > checkpoint.next_index {
                debug!(table = table.as_str(), stored = %checkpoint.next_index, reconciled = %after_last, "checkpoint behind stored rows");
                checkpoint.next_index = after_last;
            }
        }
        Ok(checkpoint)
    }

    fn append(&self, table: &TableName, record: &Record) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            r#"INSERT INTO "{}"(idx, text, digest) VALUES (?1, ?2, ?3)"#,
            table.as_str()
        )).map_err(map_sqerr)?;
        let res = stmt.execute(params![record.index.to_string(), record.text, record.digest]);
        match res {
            Ok(_) => Ok(()),
            Err(e) => {
                if let rusqlite::Error::SqliteFailure(err, _) = &e { if err.code == rusqlite::ErrorCode::ConstraintViolation { return Err(CoreError::AlreadyExists); } }
                Err(map_sqerr(e))
            }
        }
    }

    fn update_checkpoint(&self, table: &TableName, next_index: &BigUint) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE checkpoints SET next_index = ?2, updated_at = ?3 WHERE table_name = ?1",
            params![table.as_str(), next_index.to_string(), system_time_to_secs(SystemTime::now()) as i64],
        ).map_err(map_sqerr)?;
        if n == 0 {
            return Err(CoreError::Store(format!("no checkpoint row for table {}", table.as_str())));
        }
        Ok(())
    }

    fn count(&self, table: &TableName) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        if !table_exists(&conn, table)? {
            return Ok(0);
        }
        let n: i64 = conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "{}""#, table.as_str()),
            [],
            |row| row.get(0),
        ).map_err(map_sqerr)?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_db() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let store = SqliteStore::new(path).unwrap();
        (store, dir)
    }

    fn rec(i: u64, text: &str) -> Record {
        Record { index: BigUint::from(i), text: text.into(), digest: format!("h{i}") }
    }

    fn abc() -> Alphabet {
        Alphabet::new(['a', 'b', 'c']).unwrap()
    }

    #[test]
    fn fresh_table_has_zero_checkpoint() {
        let (store, _dir) = tmp_db();
        let table = TableName::default();
        assert!(!store.table_exists(&table).unwrap());
        assert_eq!(store.last_checkpoint(&table).unwrap(), Checkpoint::default());
        assert_eq!(store.count(&table).unwrap(), 0);

        store.ensure_schema(&table, &abc(), "md5").unwrap();
        assert!(store.table_exists(&table).unwrap());
        let cp = store.last_checkpoint(&table).unwrap();
        assert_eq!(cp.next_index, BigUint::default());
        assert_eq!(cp.charset.as_deref(), Some("abc"));
        assert_eq!(cp.algorithm.as_deref(), Some("md5"));
    }

    #[test]
    fn append_then_count() {
        let (store, _dir) = tmp_db();
        let table = TableName::default();
        store.ensure_schema(&table, &abc(), "md5").unwrap();
        store.append(&table, &rec(0, "a")).unwrap();
        store.append(&table, &rec(1, "b")).unwrap();
        assert_eq!(store.count(&table).unwrap(), 2);
    }

    #[test]
    fn append_duplicate_conflict() {
        let (store, _dir) = tmp_db();
        let table = TableName::default();
        store.ensure_schema(&table, &abc(), "md5").unwrap();
        store.append(&table, &rec(0, "dup")).unwrap();
        let err = store.append(&table, &rec(1, "dup")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[test]
    fn append_to_missing_table_is_store_error() {
        let (store, _dir) = tmp_db();
        let err = store.append(&TableName::default(), &rec(0, "a")).unwrap_err();
        assert!(matches!(err, CoreError::Store(_)));
        let err = store.update_checkpoint(&TableName::default(), &BigUint::from(1u32)).unwrap_err();
        assert!(matches!(err, CoreError::Store(_)));
    }

    #[test]
    fn checkpoint_reconciles_with_rows() {
        let (store, _dir) = tmp_db();
        let table = TableName::default();
        store.ensure_schema(&table, &abc(), "md5").unwrap();
        for (i, t) in ["a", "b", "c", "ba"].iter().enumerate() {
            store.append(&table, &rec(i as u64, t)).unwrap();
        }
        store.update_checkpoint(&table, &BigUint::from(2u32)).unwrap();
        assert_eq!(store.last_checkpoint(&table).unwrap().next_index, BigUint::from(4u32));

        store.update_checkpoint(&table, &BigUint::from(10u32)).unwrap();
        assert_eq!(store.last_checkpoint(&table).unwrap().next_index, BigUint::from(10u32));
    }

    #[test]
    fn big_indices_survive_storage() {
        let (store, _dir) = tmp_db();
        let table = TableName::new("big").unwrap();
        store.ensure_schema(&table, &abc(), "md5").unwrap();
        let big: BigUint = (BigUint::from(1u32) << 100u32) + BigUint::from(7u32);
        store.append(&table, &Record { index: big.clone(), text: "x".into(), digest: "d".into() }).unwrap();
        assert_eq!(store.last_checkpoint(&table).unwrap().next_index, big + 1u32);
    }

    #[test]
    fn ensure_schema_resets_rows_and_checkpoint() {
        let (store, _dir) = tmp_db();
        let table = TableName::default();
        store.ensure_schema(&table, &abc(), "md5").unwrap();
        store.append(&table, &rec(0, "a")).unwrap();
        store.update_checkpoint(&table, &BigUint::from(1u32)).unwrap();

        store.ensure_schema(&table, &abc(), "sha1").unwrap();
        store.ensure_schema(&table, &abc(), "sha1").unwrap();
        assert_eq!(store.count(&table).unwrap(), 0);
        let cp = store.last_checkpoint(&table).unwrap();
        assert_eq!(cp.next_index, BigUint::default());
        assert_eq!(cp.algorithm.as_deref(), Some("sha1"));
    }

    #[test]
    fn tables_are_independent() {
        let (store, _dir) = tmp_db();
        let one = TableName::new("one").unwrap();
        let two = TableName::new("two").unwrap();
        store.ensure_schema(&one, &abc(), "md5").unwrap();
        store.ensure_schema(&two, &abc(), "md5").unwrap();
        store.append(&one, &rec(0, "a")).unwrap();
        store.append(&two, &rec(0, "a")).unwrap();
        store.update_checkpoint(&one, &BigUint::from(1u32)).unwrap();
        assert_eq!(store.last_checkpoint(&two).unwrap().next_index, BigUint::from(1u32));
        assert_eq!(store.count(&one).unwrap(), 1);
    }

    #[test]
    fn digest_index_does_not_clash_with_table_names() {
        let (store, _dir) = tmp_db();
        let hashes = TableName::default();
        let lookalike = TableName::new("hashes_digest").unwrap();
        store.ensure_schema(&hashes, &abc(), "md5").unwrap();
        store.ensure_schema(&lookalike, &abc(), "md5").unwrap();
        store.append(&lookalike, &rec(0, "a")).unwrap();
        assert!(store.table_exists(&hashes).unwrap());
        assert_eq!(store.count(&lookalike).unwrap(), 1);
    }

    struct PlainDigest;
    impl domain::Digester for PlainDigest {
        fn algorithm(&self) -> &str {
            "plain"
        }
        fn digest(&self, input: &str) -> Result<String, CoreError> {
            Ok(input.to_string())
        }
    }

    #[test]
    fn differently_cased_name_resumes_same_table() {
        use domain::pipeline::{Enumerator, PipelineConfig};
        let (store, _dir) = tmp_db();
        let range = |lo: u32, hi: u32| {
            domain::IndexRange::new(BigUint::from(lo), BigUint::from(hi)).unwrap()
        };

        let lower = Enumerator::new(&store, PlainDigest, PipelineConfig::new(TableName::new("hashes").unwrap()));
        let first = lower.run(&range(0, 5), &abc(), false).unwrap();
        assert_eq!(first.written, 5);

        let upper = Enumerator::new(&store, PlainDigest, PipelineConfig::new(TableName::new("HASHES").unwrap()));
        let second = upper.run(&range(0, 2), &abc(), false).unwrap();
        assert!(!second.reset);
        assert_eq!(second.written, 0);

        assert_eq!(store.count(&TableName::default()).unwrap(), 5);
        assert_eq!(store.last_checkpoint(&TableName::default()).unwrap().next_index, BigUint::from(5u32));
    }

    #[test]
    fn state_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.db");
        let table = TableName::default();
        {
            let store = SqliteStore::new(&path).unwrap();
            store.ensure_schema(&table, &abc(), "md5").unwrap();
            store.append(&table, &rec(0, "a")).unwrap();
            store.update_checkpoint(&table, &BigUint::from(1u32)).unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        let cp = store.last_checkpoint(&table).unwrap();
        assert_eq!(cp.next_index, BigUint::from(1u32));
        assert_eq!(cp.charset.as_deref(), Some("abc"));
        assert_eq!(store.count(&table).unwrap(), 1);
    }
}
