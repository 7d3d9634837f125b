//! Derived TTL cache backed by the encrypted store
//!
//! Generic memoization for slow or external lookups (priced valuations).
//! Each cache is a named key/value/timestamp table inside the same store;
//! entries are overwritten wholesale on refresh, never merged.

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::LedgerStore;
use crate::error::{TallyError, TallyResult};

/// Cache table names are developer-supplied identifiers, never untrusted
/// input; anything outside this list is rejected before any SQL is built.
const ALLOWED_CACHE_TABLES: &[&str] = &["stocks", "fx_rates"];

/// A single cached row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    /// Unix milliseconds at which the value was computed
    pub computed_at: i64,
}

/// TTL-based memoizer over a named table in the store
///
/// The fetch closure is invoked only on a miss or an expired entry, and it
/// runs while the store's connection lock is held: cache-miss computation
/// is serialized process-wide.
pub struct DbCache<'s> {
    store: &'s LedgerStore,
    table: &'static str,
    fetch: Box<dyn Fn(&str) -> TallyResult<String> + 's>,
}

impl std::fmt::Debug for DbCache<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCache")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl<'s> DbCache<'s> {
    /// Bind a cache to its table, creating the table if missing
    pub fn new<F>(store: &'s LedgerStore, name: &str, fetch: F) -> TallyResult<Self>
    where
        F: Fn(&str) -> TallyResult<String> + 's,
    {
        let table = ALLOWED_CACHE_TABLES
            .iter()
            .copied()
            .find(|t| *t == name)
            .ok_or_else(|| TallyError::Config(format!("unknown cache table {name}")))?;

        let conn = store.lock_conn()?;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    computed_at INTEGER NOT NULL
                )"
            ),
            [],
        )?;
        store.flush_with(&conn)?;
        drop(conn);

        Ok(Self {
            store,
            table,
            fetch: Box::new(fetch),
        })
    }

    /// Plain memoizer: any stored entry is a hit, regardless of age
    pub fn get(&self, key: &str) -> TallyResult<String> {
        self.lookup(key, None)
    }

    /// TTL lookup: a stored entry younger than `ttl` is a hit; anything
    /// else invokes the fetch closure and upserts the fresh value
    ///
    /// A failed fetch propagates and caches nothing.
    pub fn get_with_ttl(&self, key: &str, ttl: Duration) -> TallyResult<String> {
        self.lookup(key, Some(ttl))
    }

    fn lookup(&self, key: &str, ttl: Option<Duration>) -> TallyResult<String> {
        let conn = self.store.lock_conn()?;

        let cached: Option<(String, i64)> = conn
            .query_row(
                &format!("SELECT value, computed_at FROM {} WHERE key = ?1", self.table),
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let now = Utc::now().timestamp_millis();
        if let Some((value, computed_at)) = cached {
            let fresh = ttl.map_or(true, |ttl| now - computed_at < ttl.num_milliseconds());
            if fresh {
                debug!(table = self.table, key, "cache hit");
                return Ok(value);
            }
        }

        debug!(table = self.table, key, "cache miss");
        let value = (self.fetch)(key)?;

        conn.execute(
            &format!(
                "INSERT INTO {} (key, value, computed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = ?2, computed_at = ?3",
                self.table
            ),
            params![key, value, now],
        )?;
        self.store.flush_with(&conn)?;
        Ok(value)
    }

    /// Every stored entry regardless of expiry, for inspection
    pub fn all(&self) -> TallyResult<Vec<CacheEntry>> {
        let conn = self.store.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT key, value, computed_at FROM {} ORDER BY key",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(CacheEntry {
                key: row.get(0)?,
                value: row.get(1)?,
                computed_at: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }
}

/// Symbol price lookup memoized for a day
///
/// The actual price source is injected by the caller as a
/// `(symbol) -> price` closure; this type only adds the cache layer and
/// the string round trip through the store.
pub struct PriceLookup<'s> {
    cache: DbCache<'s>,
    ttl: Duration,
}

impl<'s> PriceLookup<'s> {
    pub fn new<F>(store: &'s LedgerStore, fetch: F) -> TallyResult<Self>
    where
        F: Fn(&str) -> TallyResult<f64> + 's,
    {
        let cache = DbCache::new(store, "stocks", move |symbol| {
            Ok(format!("{:.2}", fetch(symbol)?))
        })?;
        Ok(Self {
            cache,
            ttl: Duration::hours(24),
        })
    }

    /// Current price for a symbol, at most a day stale
    pub fn get(&self, symbol: &str) -> TallyResult<f64> {
        let value = self.cache.get_with_ttl(symbol, self.ttl)?;
        value
            .parse()
            .map_err(|e| TallyError::Fetch(format!("bad cached price {value}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretKey;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn temp_store(dir: &TempDir) -> LedgerStore {
        let key = SecretKey::from_bytes(b"01234567890123456789012345678901").unwrap();
        LedgerStore::open(dir.path().join("ledger.sqlite3.encrypted"), key).unwrap()
    }

    #[test]
    fn test_unknown_cache_name_rejected() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        let err = DbCache::new(&store, "tx; DROP TABLE tx", |_| Ok(String::new())).unwrap_err();
        assert!(matches!(err, TallyError::Config(_)));
    }

    #[test]
    fn test_cold_key_invokes_fetch_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        let calls = Cell::new(0u32);

        let cache = DbCache::new(&store, "stocks", |key| {
            calls.set(calls.get() + 1);
            Ok(format!("{key}_value"))
        })
        .unwrap();

        assert_eq!(cache.get("a").unwrap(), "a_value");
        assert_eq!(calls.get(), 1);

        // Plain get is an infinite-TTL memoizer.
        assert_eq!(cache.get("a").unwrap(), "a_value");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_ttl_hit_and_expiry() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        let calls = Cell::new(0u32);

        let cache = DbCache::new(&store, "stocks", |_| {
            calls.set(calls.get() + 1);
            Ok("42.00".to_string())
        })
        .unwrap();

        cache.get_with_ttl("VTI", Duration::hours(1)).unwrap();
        assert_eq!(calls.get(), 1);

        // Within the window: no second fetch.
        cache.get_with_ttl("VTI", Duration::hours(1)).unwrap();
        assert_eq!(calls.get(), 1);

        std::thread::sleep(std::time::Duration::from_millis(30));

        // Entry is now older than the TTL: fetch runs again.
        cache.get_with_ttl("VTI", Duration::milliseconds(10)).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_fetch_failure_caches_nothing() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        let calls = Cell::new(0u32);

        let cache = DbCache::new(&store, "fx_rates", |_| {
            calls.set(calls.get() + 1);
            Err(TallyError::Fetch("an error has occurred".to_string()))
        })
        .unwrap();

        assert!(matches!(
            cache.get("EURUSD").unwrap_err(),
            TallyError::Fetch(_)
        ));
        assert_eq!(calls.get(), 1);
        assert!(cache.all().unwrap().is_empty());

        // Still a miss next time: the failure was not poisoned into the table.
        assert!(cache.get("EURUSD").is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_all_returns_expired_entries() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);

        let cache = DbCache::new(&store, "stocks", |key| Ok(key.to_uppercase())).unwrap();
        cache.get("a").unwrap();
        cache.get("b").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let entries = cache.all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "a");
        assert_eq!(entries[0].value, "A");
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite3.encrypted");
        let key = || SecretKey::from_bytes(b"01234567890123456789012345678901").unwrap();

        {
            let store = LedgerStore::open(&path, key()).unwrap();
            let cache = DbCache::new(&store, "stocks", |_| Ok("first".to_string())).unwrap();
            cache.get("VTI").unwrap();
        }

        let store = LedgerStore::open(&path, key()).unwrap();
        let cache = DbCache::new(&store, "stocks", |_| Ok("second".to_string())).unwrap();
        // The persisted entry wins; the new fetch closure is never invoked.
        assert_eq!(cache.get("VTI").unwrap(), "first");
    }

    #[test]
    fn test_price_lookup_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        let calls = Cell::new(0u32);

        let lookup = PriceLookup::new(&store, |symbol| {
            calls.set(calls.get() + 1);
            assert_eq!(symbol, "VTI");
            Ok(140.256)
        })
        .unwrap();

        // Price is cached as a two-decimal string.
        assert_eq!(lookup.get("VTI").unwrap(), 140.26);
        assert_eq!(lookup.get("VTI").unwrap(), 140.26);
        assert_eq!(calls.get(), 1);
    }
}
