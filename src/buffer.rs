//! Batched write buffer with bounded contention retries.
//!
//! Observation rows accumulate in arrival order and are written in one
//! transaction when the buffer fills (row count or batch age) and at
//! shutdown. A flush that hits transient lock contention retries with
//! back-off proportional to the attempt index; exhausting the bound discards
//! the batch. Best-effort durability: no error escapes a flush call.

use std::time::{Duration, Instant};

use crate::store::{is_transient, ObservationRow, Store};

/// Flush thresholds and retry policy.
#[derive(Debug, Clone, Copy)]
pub struct BufferConfig {
    /// Row count above which the buffer reports full.
    pub max_rows: usize,
    /// Batch age above which the buffer reports full.
    pub max_age: Duration,
    /// Bounded number of insert attempts per flush.
    pub retry_attempts: u32,
    /// Back-off unit; attempt `n` sleeps `n * retry_base`.
    pub retry_base: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_rows: 100,
            max_age: Duration::from_secs(60),
            retry_attempts: 5,
            retry_base: Duration::from_millis(200),
        }
    }
}

/// What became of one flush call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing buffered.
    Empty,
    /// All rows committed.
    Written(usize),
    /// Batch dropped after the bounded attempts were exhausted.
    Discarded { rows: usize, attempts: u32 },
}

/// Ordered pending rows plus the batch-start instant.
#[derive(Debug)]
pub struct WriteBuffer {
    rows: Vec<ObservationRow>,
    started: Instant,
    config: BufferConfig,
}

impl WriteBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            rows: Vec::with_capacity(config.max_rows + 1),
            started: Instant::now(),
            config,
        }
    }

    /// True when the row count exceeds `max_rows` or the batch has aged past
    /// `max_age`. Callers check this before each append.
    pub fn is_full(&self) -> bool {
        self.rows.len() > self.config.max_rows || self.started.elapsed() > self.config.max_age
    }

    /// Append one resolved row.
    pub fn push(&mut self, row: ObservationRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the buffered batch in arrival order within one transaction,
    /// then clear the buffer and restart the batch timer.
    ///
    /// Transient lock rejection is retried up to the configured bound with
    /// back-off proportional to the 1-based attempt index; exhaustion, or a
    /// non-transient error, discards the batch. The outcome is reported for
    /// logging and tests, never as an error.
    pub fn flush(&mut self, store: &mut Store) -> FlushOutcome {
        if self.rows.is_empty() {
            self.started = Instant::now();
            return FlushOutcome::Empty;
        }

        let rows = self.rows.len();
        let mut outcome = FlushOutcome::Discarded {
            rows,
            attempts: self.config.retry_attempts,
        };
        for attempt in 1..=self.config.retry_attempts {
            match store.insert_observations(&self.rows) {
                Ok(()) => {
                    outcome = FlushOutcome::Written(rows);
                    break;
                }
                Err(e) if is_transient(&e) && attempt < self.config.retry_attempts => {
                    let wait = self.config.retry_base * attempt;
                    log::debug!("store contended on flush attempt {attempt}, retrying in {wait:?}");
                    std::thread::sleep(wait);
                }
                Err(e) if is_transient(&e) => {
                    log::warn!("store still contended after {attempt} attempts, dropping {rows} rows");
                }
                Err(e) => {
                    log::warn!("flush failed, dropping {rows} rows: {e}");
                    outcome = FlushOutcome::Discarded { rows, attempts: attempt };
                    break;
                }
            }
        }

        self.rows.clear();
        self.started = Instant::now();
        outcome
    }
}
