//! Probe-request field extraction.
//!
//! Frames are identified and the transmitter address pulled out with the
//! `ieee80211` crate; the advertised network name is taken from the raw SSID
//! information element so that non-UTF-8 bytes survive losslessly as a
//! `b64_`-tagged base64 escape instead of being mangled or dropped.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ieee80211::match_frames;
use ieee80211::mgmt_frame::ProbeRequestFrame;

/// Tag prefixed to base64-escaped network names.
pub const B64_PREFIX: &str = "b64_";

/// Management frame header: frame control, duration, three addresses,
/// sequence control. Probe requests have no HT control or QoS fields.
const MGMT_HEADER_LEN: usize = 24;

/// Information element id of the SSID.
const ELEMENT_SSID: u8 = 0;

/// Fields extracted from one probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Transmitter address of the probing station.
    pub sender: [u8; 6],
    /// Advertised network name: empty, UTF-8 text, or a `b64_` escape.
    pub name: String,
}

/// Parse a probe request out of an 802.11 frame (radiotap already stripped).
///
/// Returns `None` for any other frame type or subtype — this is the capture
/// loop's frame-type filter for frames the BPF program let through.
pub fn parse_probe_request(frame: &[u8]) -> Option<ProbeRequest> {
    let result = match_frames! {
        frame,
        probe_req = ProbeRequestFrame<'_> => {
            probe_req.header.transmitter_address.0
        }
    };
    let sender = result.ok()?;
    let name = ssid_text(find_ssid_element(frame));
    Some(ProbeRequest { sender, name })
}

/// Locate the raw SSID element payload in the management frame body.
///
/// Elements are a [id][length][payload] sequence starting right after the
/// fixed management header. The walk stops at the first truncated element, so
/// a trailing FCS can never be misread as an element.
fn find_ssid_element(frame: &[u8]) -> Option<&[u8]> {
    let mut body = frame.get(MGMT_HEADER_LEN..)?;
    while body.len() >= 2 {
        let id = body[0];
        let len = body[1] as usize;
        if body.len() < 2 + len {
            return None;
        }
        if id == ELEMENT_SSID {
            return Some(&body[2..2 + len]);
        }
        body = &body[2 + len..];
    }
    None
}

/// Render raw SSID bytes as store-safe text.
///
/// Absent element → empty string (wildcard probe). Valid UTF-8 → the text.
/// Anything else → `b64_` + standard base64 of the exact bytes, which
/// round-trips back to the original byte sequence.
pub fn ssid_text(raw: Option<&[u8]>) -> String {
    match raw {
        None => String::new(),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_owned(),
            Err(_) => format!("{B64_PREFIX}{}", BASE64.encode(bytes)),
        },
    }
}

/// Format a 6-byte hardware address as colon-separated lower-hex, the
/// at-rest format of the address dimension.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// Parse "aa:bb:cc:dd:ee:ff" (any case, `:` or `-` separated) into bytes.
pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.split(|c| c == ':' || c == '-');
    for byte in mac.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

    /// Build a minimal probe-request frame: management header with the given
    /// transmitter address, then an SSID element and a supported-rates element.
    fn probe_frame(ssid: &[u8]) -> Vec<u8> {
        let mut frame = vec![
            0x40, 0x00, // frame control: management, probe request
            0x00, 0x00, // duration
        ];
        frame.extend_from_slice(&[0xff; 6]); // addr1: broadcast
        frame.extend_from_slice(&SENDER); // addr2: transmitter
        frame.extend_from_slice(&[0xff; 6]); // addr3: BSSID wildcard
        frame.extend_from_slice(&[0x10, 0x00]); // sequence control
        frame.push(ELEMENT_SSID);
        frame.push(ssid.len() as u8);
        frame.extend_from_slice(ssid);
        // supported rates element
        frame.extend_from_slice(&[0x01, 0x04, 0x02, 0x04, 0x0b, 0x16]);
        frame
    }

    // ── Extraction ──────────────────────────────────────────────────

    #[test]
    fn extracts_sender_and_name() {
        let probe = parse_probe_request(&probe_frame(b"home-wifi")).unwrap();
        assert_eq!(probe.sender, SENDER);
        assert_eq!(probe.name, "home-wifi");
    }

    #[test]
    fn wildcard_probe_yields_empty_name() {
        let probe = parse_probe_request(&probe_frame(b"")).unwrap();
        assert_eq!(probe.name, "");
    }

    #[test]
    fn non_probe_request_rejected() {
        let mut frame = probe_frame(b"net");
        frame[0] = 0x80; // beacon subtype
        assert!(parse_probe_request(&frame).is_none());
    }

    #[test]
    fn truncated_frame_rejected() {
        assert!(parse_probe_request(&[0x40, 0x00, 0x00]).is_none());
    }

    // ── Name escaping ───────────────────────────────────────────────

    #[test]
    fn non_utf8_name_escapes_to_b64() {
        let probe = parse_probe_request(&probe_frame(&[0xff, 0xfe])).unwrap();
        assert_eq!(probe.name, "b64_//4=");
    }

    #[test]
    fn b64_escape_round_trips_exact_bytes() {
        let raw = [0xff, 0xfe, 0x00, 0x41];
        let name = ssid_text(Some(&raw));
        let encoded = name.strip_prefix(B64_PREFIX).unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), raw);
    }

    #[test]
    fn absent_element_yields_empty() {
        assert_eq!(ssid_text(None), "");
    }

    // ── MAC helpers ─────────────────────────────────────────────────

    #[test]
    fn mac_formats_lower_hex() {
        assert_eq!(format_mac(&SENDER), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_parses_both_cases_and_separators() {
        assert_eq!(parse_mac("AA:BB:CC:DD:EE:FF"), Some(SENDER));
        assert_eq!(parse_mac("aa-bb-cc-dd-ee-ff"), Some(SENDER));
        assert_eq!(parse_mac("aa:bb:cc"), None);
        assert_eq!(parse_mac("aa:bb:cc:dd:ee:ff:00"), None);
        assert_eq!(parse_mac("zz:bb:cc:dd:ee:ff"), None);
    }

    #[test]
    fn mac_round_trips() {
        let text = format_mac(&SENDER);
        assert_eq!(parse_mac(&text), Some(SENDER));
    }
}
