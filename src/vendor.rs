//! OUI → manufacturer resolution.
//!
//! The lookup table is a local file in Wireshark `manuf` format; acquiring
//! and refreshing it is a collaborator's job. Resolution is a pure lookup:
//! every failure mode — unmapped prefix, unreadable or missing file —
//! degrades to the `"UNKNOWN"` sentinel and never propagates an error.

use std::collections::HashMap;
use std::path::Path;

use crate::frame::parse_mac;

/// Manufacturer name recorded when the prefix cannot be resolved.
pub const UNKNOWN_VENDOR: &str = "UNKNOWN";

/// In-memory OUI prefix table.
#[derive(Debug, Default)]
pub struct OuiTable {
    prefixes: HashMap<[u8; 3], String>,
}

impl OuiTable {
    /// Empty table: every lookup resolves to `UNKNOWN`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `manuf`-format file, degrading to an empty table on any
    /// read failure.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let table = Self::parse(&text);
                log::info!(
                    "loaded {} vendor prefixes from {}",
                    table.len(),
                    path.display()
                );
                table
            }
            Err(e) => {
                log::warn!(
                    "vendor table {} unavailable ({e}); all lookups degrade to {UNKNOWN_VENDOR}",
                    path.display()
                );
                Self::new()
            }
        }
    }

    /// Parse `manuf` text: `#` comments, tab-separated prefix / short name /
    /// optional long name (long preferred). Masked (/28, /36) and otherwise
    /// non-24-bit prefixes are skipped.
    fn parse(text: &str) -> Self {
        let mut prefixes = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t').map(str::trim);
            let Some(prefix) = fields.next().and_then(parse_prefix) else {
                continue;
            };
            let short = fields.next();
            let long = fields.next().filter(|s| !s.is_empty());
            if let Some(name) = long.or(short) {
                prefixes.insert(prefix, name.to_owned());
            }
        }
        Self { prefixes }
    }

    /// Resolve a hardware address to its manufacturer name.
    pub fn lookup(&self, mac: &[u8; 6]) -> &str {
        self.prefixes
            .get(&[mac[0], mac[1], mac[2]])
            .map(String::as_str)
            .unwrap_or(UNKNOWN_VENDOR)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// Accept AA:BB:CC, AA-BB-CC or AABBCC; reject masks and longer prefixes.
fn parse_prefix(token: &str) -> Option<[u8; 3]> {
    if token.contains('/') {
        return None;
    }
    let bytes = if token.len() == 6 && !token.contains(':') && !token.contains('-') {
        let mut out = [0u8; 3];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&token[i * 2..i * 2 + 2], 16).ok()?;
        }
        out
    } else {
        // Reuse the full-address parser by padding to six octets.
        let sep = if token.contains('-') { '-' } else { ':' };
        let padded = format!("{token}{sep}00{sep}00{sep}00");
        let mac = parse_mac(&padded)?;
        [mac[0], mac[1], mac[2]]
    };
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANUF: &str = "\
# This is a comment
B4:1E:52\tFlockSaf\tFlock Safety
00:40:8C\tAxis\tAxis Communications AB
58-8E-81\tSiLabs
001BC5000\tBadPrefix
00:1B:C5:00:00/36\tMasked
DC536C\tCompal\tCompal Broadband Networks
";

    #[test]
    fn parses_manuf_and_prefers_long_name() {
        let table = OuiTable::parse(MANUF);
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.lookup(&[0xb4, 0x1e, 0x52, 0x01, 0x02, 0x03]),
            "Flock Safety"
        );
        assert_eq!(table.lookup(&[0x58, 0x8e, 0x81, 0, 0, 0]), "SiLabs");
        assert_eq!(table.lookup(&[0xdc, 0x53, 0x6c, 9, 9, 9]), "Compal Broadband Networks");
    }

    #[test]
    fn masked_and_malformed_prefixes_skipped() {
        let table = OuiTable::parse(MANUF);
        assert_eq!(table.lookup(&[0x00, 0x1b, 0xc5, 0, 0, 0]), UNKNOWN_VENDOR);
    }

    #[test]
    fn unmapped_prefix_degrades_to_unknown() {
        let table = OuiTable::parse(MANUF);
        assert_eq!(table.lookup(&[1, 2, 3, 4, 5, 6]), UNKNOWN_VENDOR);
    }

    #[test]
    fn missing_file_degrades_to_empty_table() {
        let table = OuiTable::load(Path::new("/nonexistent/oui.manuf"));
        assert!(table.is_empty());
        assert_eq!(table.lookup(&[0xb4, 0x1e, 0x52, 0, 0, 0]), UNKNOWN_VENDOR);
    }
}
