//! probelog library — passive probe-request capture and ingest pipeline.
//!
//! Decodes the radiotap envelope of captured 802.11 probe requests, extracts
//! sender address and advertised network name, resolves dimension surrogate
//! ids through a bounded LRU cache backed by SQLite, and batches observation
//! rows through a contention-tolerant write buffer.
//!
//! All pipeline logic lives in this crate and is testable on any host with
//! `cargo test`; the binary is a thin consumer that provides the capture
//! interface, CLI, and signal handling.

pub mod buffer;
pub mod cache;
pub mod capture;
pub mod config;
pub mod console;
pub mod frame;
pub mod ingest;
pub mod radiotap;
pub mod store;
pub mod vendor;
