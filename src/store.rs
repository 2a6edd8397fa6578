//! SQLite-backed observation store.
//!
//! Owns the single connection, bootstraps the schema, resolves dimension
//! surrogate ids with a select → insert → re-select sequence, and inserts
//! observation batches in arrival order inside one transaction.
//!
//! Durability is explicitly best-effort: synchronous writes are relaxed and
//! the rollback journal is disabled. The store assumes a single writer; the
//! select-or-insert path is not atomic against concurrent writers, and the
//! schema's uniqueness constraints turn such a race into a per-row error
//! rather than a duplicate dimension row.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS vendor (
    id INTEGER NOT NULL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS address (
    id INTEGER NOT NULL PRIMARY KEY,
    raw_address TEXT NOT NULL UNIQUE,
    vendor_ref INTEGER NOT NULL,
    FOREIGN KEY (vendor_ref) REFERENCES vendor (id)
);
CREATE TABLE IF NOT EXISTS network_name (
    id INTEGER NOT NULL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS observation (
    timestamp REAL NOT NULL,
    address_ref INTEGER NOT NULL,
    network_name_ref INTEGER NOT NULL,
    signal_strength INTEGER NOT NULL,
    FOREIGN KEY (address_ref) REFERENCES address (id),
    FOREIGN KEY (network_name_ref) REFERENCES network_name (id)
);
CREATE INDEX IF NOT EXISTS idx_observation_timestamp ON observation (timestamp);
";

/// One resolved observation, ready for the write buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationRow {
    /// Capture time, float seconds since the epoch.
    pub timestamp: f64,
    pub address_ref: i64,
    pub network_name_ref: i64,
    /// Signed dBm; 0 means unknown.
    pub signal_strength: i8,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0} row missing after insert")]
    DimensionVanished(&'static str),
}

/// Whether an error is transient store contention worth retrying.
pub fn is_transient(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(f, _))
            if f.code == rusqlite::ErrorCode::DatabaseBusy
                || f.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

/// Single-writer handle on the observation store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        // journal_mode reports the resulting mode as a row, so it cannot go
        // through execute.
        conn.query_row("PRAGMA journal_mode = OFF", [], |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "OFF")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Surrogate id for a vendor name, inserting the row on first sighting.
    pub fn vendor_id(&self, name: &str) -> Result<i64, StoreError> {
        if let Some(id) = self.query_id("SELECT id FROM vendor WHERE name = ?1", name)? {
            return Ok(id);
        }
        self.conn
            .execute("INSERT INTO vendor (name) VALUES (?1)", [name])?;
        self.query_id("SELECT id FROM vendor WHERE name = ?1", name)?
            .ok_or(StoreError::DimensionVanished("vendor"))
    }

    /// Surrogate id for a hardware address, inserting on first sighting.
    pub fn address_id(&self, raw_address: &str, vendor_ref: i64) -> Result<i64, StoreError> {
        if let Some(id) = self.query_id("SELECT id FROM address WHERE raw_address = ?1", raw_address)? {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO address (raw_address, vendor_ref) VALUES (?1, ?2)",
            params![raw_address, vendor_ref],
        )?;
        self.query_id("SELECT id FROM address WHERE raw_address = ?1", raw_address)?
            .ok_or(StoreError::DimensionVanished("address"))
    }

    /// Surrogate id for a network name, inserting on first sighting.
    pub fn network_name_id(&self, name: &str) -> Result<i64, StoreError> {
        if let Some(id) = self.query_id("SELECT id FROM network_name WHERE name = ?1", name)? {
            return Ok(id);
        }
        self.conn
            .execute("INSERT INTO network_name (name) VALUES (?1)", [name])?;
        self.query_id("SELECT id FROM network_name WHERE name = ?1", name)?
            .ok_or(StoreError::DimensionVanished("network_name"))
    }

    /// Insert a batch of observation rows, in order, in one transaction.
    pub fn insert_observations(&mut self, rows: &[ObservationRow]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO observation (timestamp, address_ref, network_name_ref, signal_strength)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.timestamp,
                    row.address_ref,
                    row.network_name_ref,
                    row.signal_strength,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn query_id(&self, sql: &str, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn
            .query_row(sql, [key], |row| row.get(0))
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_natural_key_resolves_to_same_id_with_one_row() {
        let store = Store::open_in_memory().unwrap();
        let first = store.vendor_id("Flock Safety").unwrap();
        let second = store.vendor_id("Flock Safety").unwrap();
        assert_eq!(first, second);

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM vendor", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn distinct_keys_get_distinct_ids() {
        let store = Store::open_in_memory().unwrap();
        let a = store.network_name_id("alpha").unwrap();
        let b = store.network_name_id("beta").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn address_rows_carry_their_vendor_ref() {
        let store = Store::open_in_memory().unwrap();
        let vendor = store.vendor_id("UNKNOWN").unwrap();
        let address = store.address_id("aa:bb:cc:dd:ee:ff", vendor).unwrap();
        let stored: i64 = store
            .conn
            .query_row(
                "SELECT vendor_ref FROM address WHERE id = ?1",
                [address],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stored, vendor);
    }

    #[test]
    fn batch_insert_preserves_arrival_order() {
        let mut store = Store::open_in_memory().unwrap();
        let vendor = store.vendor_id("UNKNOWN").unwrap();
        let address = store.address_id("aa:bb:cc:dd:ee:ff", vendor).unwrap();
        let name = store.network_name_id("net").unwrap();
        let rows: Vec<ObservationRow> = (0..5)
            .map(|i| ObservationRow {
                timestamp: 1000.0 + f64::from(i),
                address_ref: address,
                network_name_ref: name,
                signal_strength: -40 - i as i8,
            })
            .collect();
        store.insert_observations(&rows).unwrap();

        let mut stmt = store
            .conn
            .prepare("SELECT signal_strength FROM observation ORDER BY rowid")
            .unwrap();
        let stored: Vec<i8> = stmt
            .query_map([], |r| r.get(0))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(stored, vec![-40, -41, -42, -43, -44]);
    }

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probes.db");
        {
            let store = Store::open(&path).unwrap();
            store.vendor_id("UNKNOWN").unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.vendor_id("UNKNOWN").unwrap(), 1);
    }
}
