//! Runtime configuration.
//!
//! A JSON config file carries what the CLI does not: the address ignore and
//! highlight lists and the write-buffer thresholds. Every field has a
//! default, and CLI flags override file values in the binary.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::buffer::BufferConfig;
use crate::frame::parse_mac;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Capture interface; must be in monitor mode.
    pub interface: String,
    /// 2.4 GHz channel to listen on.
    pub channel: u8,
    /// SQLite database path.
    pub db: PathBuf,
    /// Wireshark `manuf`-format vendor table, if available.
    pub oui_file: Option<PathBuf>,
    /// Sender addresses whose probes are not recorded.
    pub ignored: Vec<String>,
    /// Sender addresses marked in the console echo.
    pub highlights: Vec<String>,
    /// Echo one line per observation to stdout.
    pub echo: bool,
    /// Write-buffer row threshold.
    pub max_rows: usize,
    /// Write-buffer age threshold, seconds.
    pub max_age_secs: u64,
    /// Flush attempts before a contended batch is discarded.
    pub flush_retries: u32,
    /// Back-off unit between flush attempts, milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let buffer = BufferConfig::default();
        Self {
            interface: String::new(),
            channel: 1,
            db: PathBuf::from("probelog.db"),
            oui_file: None,
            ignored: Vec::new(),
            highlights: Vec::new(),
            echo: false,
            max_rows: buffer.max_rows,
            max_age_secs: buffer.max_age.as_secs(),
            flush_retries: buffer.retry_attempts,
            retry_delay_ms: buffer.retry_base.as_millis() as u64,
        }
    }
}

impl Config {
    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            max_rows: self.max_rows,
            max_age: Duration::from_secs(self.max_age_secs),
            retry_attempts: self.flush_retries,
            retry_base: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn ignored_set(&self) -> HashSet<[u8; 6]> {
        parse_mac_list(&self.ignored, "ignore")
    }

    pub fn highlight_set(&self) -> HashSet<[u8; 6]> {
        parse_mac_list(&self.highlights, "highlight")
    }
}

fn parse_mac_list(list: &[String], what: &str) -> HashSet<[u8; 6]> {
    list.iter()
        .filter_map(|text| match parse_mac(text) {
            Some(mac) => Some(mac),
            None => {
                log::warn!("skipping malformed {what}-list address {text:?}");
                None
            }
        })
        .collect()
}
