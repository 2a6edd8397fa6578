//! Optional per-observation console line.
//!
//! One line per recorded probe request: ISO-8601 local timestamp with
//! milliseconds, sender address, fixed-width vendor and network name, signal
//! strength. Addresses on the highlight list are wrapped in `*` markers —
//! plain text, no terminal coloring.

use chrono::{Local, LocalResult, TimeZone};

const VENDOR_WIDTH: usize = 24;
const NAME_WIDTH: usize = 32;

/// Format one observation for stdout echo.
pub fn observation_line(
    timestamp: f64,
    address: &str,
    vendor: &str,
    name: &str,
    signal_dbm: i8,
    highlighted: bool,
) -> String {
    let address = if highlighted {
        format!("*{address}*")
    } else {
        format!(" {address} ")
    };
    format!(
        "{}\t{}\t{:<vw$.vw$}\t{:<nw$.nw$}\t{:>4}",
        iso8601(timestamp),
        address,
        vendor,
        name,
        signal_dbm,
        vw = VENDOR_WIDTH,
        nw = NAME_WIDTH,
    )
}

/// Float seconds since the epoch → local ISO-8601 with millisecond precision.
fn iso8601(timestamp: f64) -> String {
    let secs = timestamp.trunc() as i64;
    let nanos = (timestamp.fract().abs() * 1e9) as u32;
    match Local.timestamp_opt(secs, nanos) {
        LocalResult::Single(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        _ => format!("{timestamp:.3}"),
    }
}
