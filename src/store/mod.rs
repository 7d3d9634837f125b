//! Encrypted persistent store
//!
//! The encrypted file is decrypted once at construction into a
//! tempfile-backed SQLite database; all operations run against that single
//! live connection. Writes re-seal the plaintext with a fresh IV and
//! atomically overwrite the encrypted file at the end of each batch, so the
//! on-disk envelope is always current after a successful write. The
//! ephemeral plaintext is deleted when the store is dropped.
//!
//! Concurrency: one RwLock guards the in-memory snapshot and one Mutex
//! guards the connection. Every write holds both for its whole
//! mutate-refresh-seal cycle; reads take only the read lock and never touch
//! disk. Single owning process; two processes opening the same encrypted
//! file will clobber each other (last close wins).

pub mod cache;
mod schema;
mod snapshot;

pub use cache::{CacheEntry, DbCache, PriceLookup};
pub use snapshot::{SliceFilter, UNCATEGORIZED};

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use tempfile::{NamedTempFile, TempPath};
use tracing::debug;

use crate::crypto::{envelope, SecretKey};
use crate::error::{TallyError, TallyResult};
use crate::models::{investment, Holding, Investment, Transaction, TxSlice};
use crate::reconcile;
use schema::DB_DATE_FORMAT;
use snapshot::Snapshot;

/// The encrypted ledger store
pub struct LedgerStore {
    encrypted_path: PathBuf,
    key: SecretKey,
    conn: Mutex<Connection>,
    plain_path: TempPath,
    snapshot: RwLock<Snapshot>,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("encrypted_path", &self.encrypted_path)
            .finish_non_exhaustive()
    }
}

impl LedgerStore {
    /// Open (or create) the encrypted ledger at `encrypted_path`
    ///
    /// A missing file materializes an empty schema. An existing file is
    /// decrypted into an ephemeral plaintext working copy; a payload the
    /// relational engine rejects (wrong key, corrupted bytes) surfaces as
    /// `CorruptStore`.
    pub fn open(encrypted_path: impl Into<PathBuf>, key: SecretKey) -> TallyResult<Self> {
        let encrypted_path = encrypted_path.into();
        let plain_path = NamedTempFile::new()?.into_temp_path();

        if encrypted_path.exists() {
            let ciphertext = fs::read(&encrypted_path)?;
            let start = Instant::now();
            let plaintext = envelope::open(&key, &ciphertext)?;
            debug!(
                elapsed = ?start.elapsed(),
                bytes = plaintext.len(),
                path = %encrypted_path.display(),
                "decrypted ledger"
            );
            fs::write(&plain_path, &plaintext)?;
        }

        let conn = Connection::open(&plain_path)
            .map_err(|e| TallyError::CorruptStore(e.to_string()))?;
        schema::ensure(&conn).map_err(|e| TallyError::CorruptStore(e.to_string()))?;
        let snapshot = Snapshot::load(&conn)?;

        Ok(Self {
            encrypted_path,
            key,
            conn: Mutex::new(conn),
            plain_path,
            snapshot: RwLock::new(snapshot),
        })
    }

    // -- read operations: snapshot only, never disk --

    /// Every transaction in snapshot order
    pub fn all_transactions(&self) -> TallyResult<Vec<Transaction>> {
        Ok(self.read_snapshot()?.transactions.clone())
    }

    /// Every investment lot in snapshot order
    pub fn all_investments(&self) -> TallyResult<Vec<Investment>> {
        Ok(self.read_snapshot()?.investments.clone())
    }

    /// Derived holdings, grouped by (account, symbol)
    pub fn holdings(&self) -> TallyResult<Vec<Holding>> {
        Ok(investment::holdings(&self.read_snapshot()?.investments))
    }

    /// Date of the earliest transaction, if any
    pub fn start(&self) -> TallyResult<Option<NaiveDate>> {
        Ok(self.read_snapshot()?.transactions.first().map(|tx| tx.date))
    }

    /// Date of the latest transaction, if any
    pub fn end(&self) -> TallyResult<Option<NaiveDate>> {
        Ok(self.read_snapshot()?.transactions.last().map(|tx| tx.date))
    }

    /// Transactions matching the filter, in snapshot order
    pub fn slice(&self, filter: &SliceFilter) -> TallyResult<TxSlice> {
        let snapshot = self.read_snapshot()?;
        Ok(TxSlice::new(
            snapshot
                .transactions
                .iter()
                .filter(|tx| filter.matches(tx))
                .cloned()
                .collect(),
        ))
    }

    /// The whole snapshot as a slice
    pub fn default_slice(&self) -> TallyResult<TxSlice> {
        Ok(TxSlice::new(self.all_transactions()?))
    }

    // -- write operations: serialized, refresh-then-seal --

    /// Insert transactions, skipping any whose id already exists
    ///
    /// Re-importing a batch that was already inserted is a no-op.
    pub fn insert(&self, transactions: &[Transaction]) -> TallyResult<()> {
        let mut snapshot = self.write_snapshot()?;
        let conn = self.lock_conn()?;

        let mut seen: HashSet<String> = snapshot
            .transactions
            .iter()
            .map(Transaction::id)
            .collect();

        for tx in transactions {
            let id = tx.id();
            if !seen.insert(id.clone()) {
                debug!(%id, "transaction already in store, skipping");
                continue;
            }

            let rows = exec(
                &conn,
                "INSERT INTO tx (source, date, memo, amount, disambiguation, category, ignored)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    tx.source,
                    tx.date.format(DB_DATE_FORMAT).to_string(),
                    tx.memo,
                    tx.amount.cents(),
                    tx.disambiguation,
                    tx.category,
                    tx.ignored,
                ],
            )?;
            if rows != 1 {
                return Err(TallyError::Consistency { id });
            }
        }

        *snapshot = Snapshot::load(&conn)?;
        self.flush_with(&conn)
    }

    /// Update the mutable fields (category, ignored, source) of existing
    /// transactions, matched by their exact immutable tuple
    ///
    /// Any row count other than one aborts with `Consistency` naming the
    /// entity's id; the snapshot is left untouched on failure.
    pub fn update(&self, transactions: &[Transaction]) -> TallyResult<()> {
        let mut snapshot = self.write_snapshot()?;
        let conn = self.lock_conn()?;

        for tx in transactions {
            let rows = exec(
                &conn,
                "UPDATE tx SET category = ?1, ignored = ?2, source = ?3
                 WHERE date = ?4 AND amount = ?5 AND memo = ?6 AND disambiguation = ?7",
                params![
                    tx.category,
                    tx.ignored,
                    tx.source,
                    tx.date.format(DB_DATE_FORMAT).to_string(),
                    tx.amount.cents(),
                    tx.memo,
                    tx.disambiguation,
                ],
            )?;
            if rows != 1 {
                return Err(TallyError::Consistency { id: tx.id() });
            }
        }

        *snapshot = Snapshot::load(&conn)?;
        self.flush_with(&conn)
    }

    /// Insert investment lots, skipping any whose id already exists
    pub fn insert_investments(&self, investments: &[Investment]) -> TallyResult<()> {
        let mut snapshot = self.write_snapshot()?;
        let conn = self.lock_conn()?;

        let mut seen: HashSet<String> = snapshot
            .investments
            .iter()
            .map(Investment::id)
            .collect();

        for inv in investments {
            let id = inv.id();
            if !seen.insert(id.clone()) {
                debug!(%id, "investment already in store, skipping");
                continue;
            }

            let rows = exec(
                &conn,
                "INSERT INTO investment (account, date, kind, symbol, shares, price, disambiguation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    inv.account,
                    inv.date.format(DB_DATE_FORMAT).to_string(),
                    inv.kind,
                    inv.symbol,
                    inv.shares,
                    inv.price,
                    inv.disambiguation,
                ],
            )?;
            if rows != 1 {
                return Err(TallyError::Consistency { id });
            }
        }

        *snapshot = Snapshot::load(&conn)?;
        self.flush_with(&conn)
    }

    /// Parse an edited table, diff it against the snapshot, and apply the
    /// changed-set through the update path
    ///
    /// Returns the number of changed entities. A row referencing an unknown
    /// id aborts the whole batch before anything is applied.
    pub fn save_edit_csv(&self, contents: &[u8]) -> TallyResult<usize> {
        let changed = {
            let snapshot = self.read_snapshot()?;
            reconcile::parse_edit_csv(contents, &snapshot.transactions)?
        };
        let count = changed.len();
        self.update(&changed)?;
        Ok(count)
    }

    // -- journal: collaborator feature sharing the store lifecycle --

    /// Upsert the journal entry for a day
    pub fn journal_set(&self, date: NaiveDate, entry: &str) -> TallyResult<()> {
        let conn = self.lock_conn()?;
        exec(
            &conn,
            "INSERT INTO journal (date, entry) VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET entry = ?2",
            params![date.format(DB_DATE_FORMAT).to_string(), entry],
        )?;
        self.flush_with(&conn)
    }

    /// Fetch the journal entry for a day
    pub fn journal_get(&self, date: NaiveDate) -> TallyResult<Option<String>> {
        let conn = self.lock_conn()?;
        Ok(conn
            .query_row(
                "SELECT entry FROM journal WHERE date = ?1",
                params![date.format(DB_DATE_FORMAT).to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    // -- maintenance --

    /// Seal the current plaintext and overwrite the encrypted file
    ///
    /// Writes already flush at the end of each batch; this is the explicit
    /// shutdown checkpoint.
    pub fn flush(&self) -> TallyResult<()> {
        let conn = self.lock_conn()?;
        self.flush_with(&conn)
    }

    /// Dump the decrypted database bytes to `outfile`
    pub fn write_decrypted(&self, outfile: impl AsRef<Path>) -> TallyResult<()> {
        let _conn = self.lock_conn()?;
        let data = fs::read(&self.plain_path)?;
        fs::write(outfile, data)?;
        Ok(())
    }

    // -- internals --

    /// Seal and persist; the caller must hold the connection lock so no
    /// write can interleave with the seal.
    fn flush_with(&self, _conn: &Connection) -> TallyResult<()> {
        let start = Instant::now();
        let plaintext = fs::read(&self.plain_path)?;
        let sealed = envelope::seal(&self.key, &plaintext);
        atomic_write(&self.encrypted_path, &sealed)?;
        debug!(
            elapsed = ?start.elapsed(),
            bytes = sealed.len(),
            path = %self.encrypted_path.display(),
            "sealed ledger"
        );
        Ok(())
    }

    fn read_snapshot(&self) -> TallyResult<RwLockReadGuard<'_, Snapshot>> {
        self.snapshot
            .read()
            .map_err(|e| TallyError::Storage(format!("failed to acquire read lock: {e}")))
    }

    fn write_snapshot(&self) -> TallyResult<RwLockWriteGuard<'_, Snapshot>> {
        self.snapshot
            .write()
            .map_err(|e| TallyError::Storage(format!("failed to acquire write lock: {e}")))
    }

    fn lock_conn(&self) -> TallyResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TallyError::Storage(format!("failed to acquire connection lock: {e}")))
    }
}

fn exec(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> TallyResult<usize> {
    debug!(sql, "exec");
    Ok(conn.execute(sql, params)?)
}

/// Write-to-temp-then-rename so the encrypted file is never half-written
fn atomic_write(path: &Path, data: &[u8]) -> TallyResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_os = path.as_os_str().to_owned();
    tmp_os.push(".tmp");
    let tmp = PathBuf::from(tmp_os);

    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        TallyError::Io(format!("failed to replace {}: {}", path.display(), e))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Money;
    use tempfile::TempDir;

    fn test_key() -> SecretKey {
        SecretKey::from_bytes(b"01234567890123456789012345678901").unwrap()
    }

    fn temp_store(dir: &TempDir) -> LedgerStore {
        LedgerStore::open(dir.path().join("ledger.sqlite3.encrypted"), test_key()).unwrap()
    }

    fn tx(source: &str, date: &str, memo: &str, cents: i64) -> Transaction {
        Transaction::new(
            source,
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            memo,
            Money::from_cents(cents),
        )
    }

    fn lot(account: i64, date: &str, symbol: &str, shares: f64, price: f64) -> Investment {
        Investment {
            account,
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            kind: "BUY".to_string(),
            symbol: symbol.to_string(),
            shares,
            price,
            disambiguation: String::new(),
        }
    }

    #[test]
    fn test_empty_store_materializes() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        assert!(store.all_transactions().unwrap().is_empty());
        assert_eq!(store.start().unwrap(), None);
        assert_eq!(store.end().unwrap(), None);
    }

    #[test]
    fn test_insert_and_idempotent_reinsert() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        let t = tx("dcu", "2018-01-01", "memo", -110);
        store.insert(std::slice::from_ref(&t)).unwrap();
        assert_eq!(store.all_transactions().unwrap().len(), 1);

        // Same id again: snapshot cardinality unchanged.
        store.insert(std::slice::from_ref(&t)).unwrap();
        assert_eq!(store.all_transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_update_preserves_id() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        let t = tx("dcu", "2018-01-01", "memo", -110);
        let id = t.id();
        store.insert(std::slice::from_ref(&t)).unwrap();

        let mut edited = t.clone();
        edited.category = "new_category".to_string();
        edited.ignored = true;
        store.update(std::slice::from_ref(&edited)).unwrap();

        let all = store.all_transactions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id(), id);
        assert_eq!(all[0].category, "new_category");
        assert!(all[0].ignored);
    }

    #[test]
    fn test_update_unknown_tuple_is_consistency_error() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        let phantom = tx("dcu", "2018-01-01", "never inserted", -999);
        let err = store.update(std::slice::from_ref(&phantom)).unwrap_err();
        assert!(matches!(err, TallyError::Consistency { id } if id == phantom.id()));

        // Failed write must not refresh or grow the snapshot.
        assert!(store.all_transactions().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_order_is_stable() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        store
            .insert(&[
                tx("dcu", "2018-01-03", "c", -300),
                tx("dcu", "2018-01-01", "b", -100),
                tx("dcu", "2018-01-01", "a", -200),
            ])
            .unwrap();

        let all = store.all_transactions().unwrap();
        let memos: Vec<&str> = all.iter().map(|t| t.memo.as_str()).collect();
        // date first, then amount (-200 < -100)
        assert_eq!(memos, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite3.encrypted");

        {
            let store = LedgerStore::open(&path, test_key()).unwrap();
            store.insert(&[tx("dcu", "2018-01-01", "memo", -110)]).unwrap();
        }

        let reopened = LedgerStore::open(&path, test_key()).unwrap();
        let all = reopened.all_transactions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].memo, "memo");
        assert_eq!(all[0].amount, Money::from_cents(-110));
    }

    #[test]
    fn test_wrong_key_is_corrupt_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite3.encrypted");

        {
            let store = LedgerStore::open(&path, test_key()).unwrap();
            store.insert(&[tx("dcu", "2018-01-01", "memo", -110)]).unwrap();
        }

        let wrong = SecretKey::from_bytes(b"99999999999999999999999999999999").unwrap();
        let err = LedgerStore::open(&path, wrong).unwrap_err();
        assert!(matches!(err, TallyError::CorruptStore(_)));
    }

    #[test]
    fn test_slice_filters_and_orders() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        let mut rent = tx("dcu", "2018-02-01", "rent feb", -90_000);
        rent.category = "rent".to_string();
        store
            .insert(&[
                tx("dcu", "2018-01-01", "coffee", -450),
                rent,
                tx("dcu", "2018-03-01", "coffee again", -450),
            ])
            .unwrap();

        let slice = store
            .slice(&SliceFilter {
                categories: vec![UNCATEGORIZED.to_string()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(slice.len(), 2);

        let slice = store
            .slice(&SliceFilter {
                end: Some(NaiveDate::from_ymd_opt(2018, 2, 28).unwrap()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice.transactions()[0].memo, "coffee");
    }

    #[test]
    fn test_start_and_end() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        store
            .insert(&[
                tx("dcu", "2018-01-05", "late", -100),
                tx("dcu", "2018-01-01", "early", -100),
            ])
            .unwrap();

        assert_eq!(store.start().unwrap(), NaiveDate::from_ymd_opt(2018, 1, 1));
        assert_eq!(store.end().unwrap(), NaiveDate::from_ymd_opt(2018, 1, 5));
    }

    #[test]
    fn test_insert_investments_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        let lots = vec![
            lot(100, "2018-03-15", "VTI", 2.0, 140.25),
            lot(100, "2018-03-16", "BND", 5.0, 80.10),
        ];
        store.insert_investments(&lots).unwrap();
        store.insert_investments(&lots).unwrap();

        assert_eq!(store.all_investments().unwrap().len(), 2);
        let holdings = store.holdings().unwrap();
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].key(), "100-BND");
    }

    #[test]
    fn test_journal_upsert_and_get() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        let day = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();

        assert_eq!(store.journal_get(day).unwrap(), None);
        store.journal_set(day, "first entry").unwrap();
        store.journal_set(day, "revised entry").unwrap();
        assert_eq!(
            store.journal_get(day).unwrap().as_deref(),
            Some("revised entry")
        );
    }

    #[test]
    fn test_write_decrypted_is_plain_sqlite() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        store.insert(&[tx("dcu", "2018-01-01", "memo", -110)]).unwrap();

        let out = dir.path().join("plain.sqlite3");
        store.write_decrypted(&out).unwrap();

        let bytes = fs::read(&out).unwrap();
        assert!(bytes.starts_with(b"SQLite format 3"));
    }

    #[test]
    fn test_encrypted_file_is_not_plaintext() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite3.encrypted");
        let store = LedgerStore::open(&path, test_key()).unwrap();
        store.insert(&[tx("dcu", "2018-01-01", "memo", -110)]).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(!bytes.starts_with(b"SQLite format 3"));
    }
}
