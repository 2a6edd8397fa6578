//! Ingestion context: the mutable state the capture loop threads through
//! each stage.
//!
//! Owns the store, the dimension caches, the write buffer and the vendor
//! table — explicit and passed by reference, not process-wide singletons.
//! `record` resolves the three dimensions (cache fast path, or the store's
//! cold select-or-insert path) and appends the observation to the buffer,
//! flushing first when the buffer reports full. Dimension lookups share the
//! store connection and complete before the row is appended, so a flush can
//! never interleave with a half-resolved row.

use crate::buffer::{FlushOutcome, WriteBuffer};
use crate::cache::{DimensionCache, LruMap};
use crate::frame::{format_mac, ProbeRequest};
use crate::store::{ObservationRow, Store, StoreError};
use crate::vendor::OuiTable;

pub struct IngestContext {
    store: Store,
    oui: OuiTable,
    cache: DimensionCache,
    buffer: WriteBuffer,
}

impl IngestContext {
    pub fn new(store: Store, oui: OuiTable, buffer: WriteBuffer) -> Self {
        Self {
            store,
            oui,
            cache: DimensionCache::new(),
            buffer,
        }
    }

    /// Resolve and buffer one observation. Returns the resolved vendor name
    /// for the optional console echo.
    pub fn record(
        &mut self,
        timestamp: f64,
        probe: &ProbeRequest,
        signal_dbm: i8,
    ) -> Result<String, StoreError> {
        let address = format_mac(&probe.sender);
        let vendor = self.oui.lookup(&probe.sender).to_owned();

        let vendor_ref = resolve(&mut self.cache.vendors, &vendor, |name| {
            self.store.vendor_id(name)
        })?;
        let address_ref = resolve(&mut self.cache.addresses, &address, |addr| {
            self.store.address_id(addr, vendor_ref)
        })?;
        let network_name_ref = resolve(&mut self.cache.names, &probe.name, |name| {
            self.store.network_name_id(name)
        })?;

        if self.buffer.is_full() {
            log_flush(self.buffer.flush(&mut self.store));
        }
        self.buffer.push(ObservationRow {
            timestamp,
            address_ref,
            network_name_ref,
            signal_strength: signal_dbm,
        });
        Ok(vendor)
    }

    /// Drain the buffer unconditionally (shutdown path).
    pub fn flush(&mut self) -> FlushOutcome {
        let outcome = self.buffer.flush(&mut self.store);
        log_flush(outcome);
        outcome
    }

    pub fn pending_rows(&self) -> usize {
        self.buffer.len()
    }
}

/// Cache fast path, else fetch from the store and populate the cache.
///
/// The cache entry is written only after the store call succeeds, keeping the
/// invariant that a cached id always has a backing dimension row.
fn resolve(
    cache: &mut LruMap<String, i64>,
    key: &str,
    fetch: impl FnOnce(&str) -> Result<i64, StoreError>,
) -> Result<i64, StoreError> {
    if let Some(&id) = cache.get(key) {
        return Ok(id);
    }
    let id = fetch(key)?;
    cache.insert(key.to_owned(), id);
    Ok(id)
}

fn log_flush(outcome: FlushOutcome) {
    match outcome {
        FlushOutcome::Empty => {}
        FlushOutcome::Written(rows) => log::debug!("flushed {rows} observation rows"),
        FlushOutcome::Discarded { rows, attempts } => {
            log::warn!("discarded a batch of {rows} rows after {attempts} attempts");
        }
    }
}
