//! Radiotap capture-envelope decoder.
//!
//! Radiotap prepends a little-endian, variable-layout header to frames
//! captured on a monitor-mode interface. The layout is driven by a presence
//! bitmask: an 8-byte preamble carries a 32-bit present-flags word whose high
//! bit chains further 32-bit extension words, and the data area packs only
//! the fields whose bits are set, each with its own size and natural
//! alignment (relative to the start of the envelope).
//!
//! This decoder extracts exactly one field — antenna signal strength in dBm
//! (present bit 5) — plus the validated envelope length so the caller can
//! locate the 802.11 frame that follows.

use thiserror::Error;

/// Present-flag bit index of the antenna-signal field.
pub const DBM_ANTSIGNAL: u32 = 5;

/// High bit of a present word: another present word follows.
const PRESENT_EXT: u32 = 1 << 31;

/// Fixed preamble: version, pad, u16 length, u32 present flags.
const PREAMBLE_LEN: usize = 8;

/// (size, alignment) of the fields preceding antenna signal, in bit order:
/// TSFT, flags, rate, channel, FHSS.
const FIELD_LAYOUT: [(usize, usize); DBM_ANTSIGNAL as usize] =
    [(8, 8), (1, 1), (1, 1), (4, 2), (2, 2)];

/// Decode failure on a malformed or truncated envelope.
///
/// The capture loop treats any of these as signal-unknown; none of them may
/// ever be "resolved" by reading past the declared header length.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too short for radiotap preamble")]
    Truncated,
    #[error("unsupported radiotap version {0}")]
    BadVersion(u8),
    #[error("declared header length {declared} outside capture of {captured} bytes")]
    BadLength { declared: usize, captured: usize },
    #[error("present-flag chain runs past the header")]
    PresentOverrun,
    #[error("field offset {offset} outside header of {header_len} bytes")]
    FieldOverrun { offset: usize, header_len: usize },
}

/// Decoded envelope: validated length and antenna signal, if present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Radiotap {
    /// Declared envelope length; the 802.11 frame starts at this offset.
    pub header_len: usize,
    /// Antenna signal in dBm, `None` when the presence bit is unset.
    pub dbm_antsignal: Option<i8>,
}

impl Radiotap {
    /// Signal strength with the at-rest sentinel: 0 means unknown.
    pub fn signal_dbm(&self) -> i8 {
        self.dbm_antsignal.unwrap_or(0)
    }
}

/// Validate the preamble and return the declared envelope length.
///
/// Cheap enough to use as a fallback when the full decode fails: a frame with
/// a broken field layout still has a locatable 802.11 payload as long as the
/// length field itself is sane.
pub fn header_length(buf: &[u8]) -> Result<usize, DecodeError> {
    if buf.len() < PREAMBLE_LEN {
        return Err(DecodeError::Truncated);
    }
    let declared = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    if declared < PREAMBLE_LEN || declared > buf.len() {
        return Err(DecodeError::BadLength {
            declared,
            captured: buf.len(),
        });
    }
    Ok(declared)
}

/// Decode the envelope and extract the antenna-signal field.
///
/// When present bit 5 is unset this returns immediately without walking the
/// field layout. When set, the offset is computed by walking every
/// lower-indexed present field in bit order, applying each field's alignment
/// before adding its size — fields are packed contiguously with
/// presence-dependent padding, so the offset differs per presence combination.
pub fn parse(buf: &[u8]) -> Result<Radiotap, DecodeError> {
    let header_len = header_length(buf)?;
    if buf[0] != 0 {
        return Err(DecodeError::BadVersion(buf[0]));
    }

    let present = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if present & (1 << DBM_ANTSIGNAL) == 0 {
        return Ok(Radiotap {
            header_len,
            dbm_antsignal: None,
        });
    }

    // Each chained extension word widens the preamble by 4 bytes and shifts
    // the packed data area back.
    let mut data_start = PREAMBLE_LEN;
    let mut word = present;
    while word & PRESENT_EXT != 0 {
        if data_start + 4 > header_len {
            return Err(DecodeError::PresentOverrun);
        }
        word = u32::from_le_bytes([
            buf[data_start],
            buf[data_start + 1],
            buf[data_start + 2],
            buf[data_start + 3],
        ]);
        data_start += 4;
    }

    let mut offset = data_start;
    for (bit, &(size, align)) in FIELD_LAYOUT.iter().enumerate() {
        if present & (1 << bit) != 0 {
            offset = align_up(offset, align);
            offset += size;
        }
    }

    // Antenna signal is a single byte with no alignment requirement.
    if offset >= header_len {
        return Err(DecodeError::FieldOverrun { offset, header_len });
    }
    Ok(Radiotap {
        header_len,
        dbm_antsignal: Some(buf[offset] as i8),
    })
}

/// Round `offset` up to the next multiple of `align` (align is 1, 2 or 8).
fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an envelope with the given present words and data bytes,
    /// patching the declared length to the real size.
    fn envelope(present_words: &[u32], data: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8, 0u8, 0u8, 0u8];
        for word in present_words {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf.extend_from_slice(data);
        let len = buf.len() as u16;
        buf[2..4].copy_from_slice(&len.to_le_bytes());
        buf
    }

    // ── Absent antenna signal ───────────────────────────────────────

    #[test]
    fn absent_bit_yields_unknown_signal() {
        // TSFT + flags present, antenna signal absent
        let buf = envelope(&[0b11], &[0; 16]);
        let rt = parse(&buf).unwrap();
        assert_eq!(rt.dbm_antsignal, None);
        assert_eq!(rt.signal_dbm(), 0);
        assert_eq!(rt.header_len, buf.len());
    }

    #[test]
    fn absent_bit_ignores_broken_field_area() {
        // Declared length covers only the preamble; with bit 5 unset the
        // decoder must not touch the (empty) data area at all.
        let buf = envelope(&[0b1_1111], &[]);
        assert_eq!(parse(&buf).unwrap().dbm_antsignal, None);
    }

    // ── Offset computation per presence combination ─────────────────

    /// Independently lay out the preceding fields the way the radiotap
    /// standard packs them, returning the expected antenna-signal offset.
    fn expected_offset(present: u32, data_start: usize) -> usize {
        let sizes = [8usize, 1, 1, 4, 2];
        let aligns = [8usize, 1, 1, 2, 2];
        let mut off = data_start;
        for bit in 0..5 {
            if present & (1 << bit) != 0 {
                let a = aligns[bit];
                off = (off + a - 1) / a * a;
                off += sizes[bit];
            }
        }
        off
    }

    #[test]
    fn signal_found_for_every_preceding_presence_combination() {
        for combo in 0u32..32 {
            let present = combo | (1 << DBM_ANTSIGNAL);
            let off = expected_offset(present, 8);
            let mut data = vec![0u8; off - 8 + 1];
            *data.last_mut().unwrap() = (-47i8) as u8;
            let buf = envelope(&[present], &data);
            let rt = parse(&buf).unwrap_or_else(|e| panic!("combo {combo:05b}: {e}"));
            assert_eq!(rt.dbm_antsignal, Some(-47), "combo {combo:05b}");
        }
    }

    #[test]
    fn extension_words_shift_the_data_area() {
        // Two chained present words; signal-only layout puts the value
        // immediately after the widened preamble.
        let first = (1 << DBM_ANTSIGNAL) | PRESENT_EXT;
        let second = 0u32;
        let buf = envelope(&[first, second], &[(-60i8) as u8]);
        assert_eq!(parse(&buf).unwrap().dbm_antsignal, Some(-60));
    }

    #[test]
    fn chained_extension_words_chain_again() {
        let first = (1 << DBM_ANTSIGNAL) | PRESENT_EXT;
        let second = PRESENT_EXT;
        let third = 0u32;
        let buf = envelope(&[first, second, third], &[(-33i8) as u8]);
        assert_eq!(parse(&buf).unwrap().dbm_antsignal, Some(-33));
    }

    // ── Malformed input ─────────────────────────────────────────────

    #[test]
    fn truncated_preamble() {
        assert_eq!(parse(&[0, 0, 8]), Err(DecodeError::Truncated));
        assert_eq!(header_length(&[]), Err(DecodeError::Truncated));
    }

    #[test]
    fn declared_length_past_capture() {
        let mut buf = envelope(&[1 << DBM_ANTSIGNAL], &[0]);
        buf[2] = 0xff;
        assert!(matches!(parse(&buf), Err(DecodeError::BadLength { .. })));
    }

    #[test]
    fn declared_length_below_preamble() {
        let mut buf = envelope(&[0], &[]);
        buf[2] = 4;
        assert!(matches!(parse(&buf), Err(DecodeError::BadLength { .. })));
    }

    #[test]
    fn nonzero_version_rejected() {
        let mut buf = envelope(&[0], &[]);
        buf[0] = 1;
        assert_eq!(parse(&buf), Err(DecodeError::BadVersion(1)));
    }

    #[test]
    fn unterminated_extension_chain() {
        // Single word claiming an extension, but the header ends right after.
        let buf = envelope(&[(1 << DBM_ANTSIGNAL) | PRESENT_EXT], &[]);
        assert_eq!(parse(&buf), Err(DecodeError::PresentOverrun));
    }

    #[test]
    fn signal_offset_at_header_end_is_an_error() {
        // Bit set but no data byte inside the declared length.
        let buf = envelope(&[1 << DBM_ANTSIGNAL], &[]);
        assert!(matches!(parse(&buf), Err(DecodeError::FieldOverrun { .. })));
    }

    #[test]
    fn never_reads_past_declared_length() {
        // The byte that would hold the signal exists in the capture but lies
        // beyond the declared header length — must fail, not read it.
        let mut buf = envelope(&[(1 << DBM_ANTSIGNAL) | 1], &[0; 17]);
        let declared = 8u16; // preamble only
        buf[2..4].copy_from_slice(&declared.to_le_bytes());
        assert!(matches!(parse(&buf), Err(DecodeError::FieldOverrun { .. })));
    }
}
