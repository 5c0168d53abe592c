//! Fixed 20-byte ASCII message header.
//!
//! Every Open Protocol frame starts with the same 20 ASCII bytes at fixed
//! offsets: a 4-digit length (header included, trailing NUL excluded), the
//! 4-digit MID, a 3-character revision, and single- or double-character link
//! fields. Fields that carry no value are space-filled, so accessors parse
//! leniently: blank or garbage numeric fields read as zero rather than
//! failing the frame.

use crate::errors::{ProtocolError, Result};

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 20;

/// Frame terminator byte for ASCII messages (excluded from `length`).
pub const NUL: u8 = 0;

/// Normalize a MID to its canonical 4-digit form.
///
/// Left-pads with `0` and keeps the trailing four characters, so `"1"`
/// becomes `"0001"` and `"12345"` becomes `"2345"`. Idempotent.
#[must_use]
pub fn normalize_mid(mid: &str) -> String {
    let padded = format!("{mid:0>4}");
    let start = padded.len() - 4;
    padded[start..].to_string()
}

/// Advance a link-level sequence number.
///
/// Sequence numbers cycle on `[1, 99]`; zero is reserved for "no sequence"
/// and is never produced.
#[must_use]
pub fn next_sequence(seq: u8) -> u8 {
    if seq >= 99 { 1 } else { seq + 1 }
}

/// Parsed view of the 20-byte header.
///
/// String fields keep their exact wire width (`revision` is 3 characters,
/// `station_id` 2, ...) so a header can be re-encoded byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total frame length: 20-byte header plus payload, excluding NUL.
    pub length: usize,
    /// 4-digit message identifier.
    pub mid: String,
    /// 3-character revision; digits or spaces, `000`/blank means "any".
    pub revision: String,
    /// `1` when the sender asks for no application acknowledge, else space.
    pub no_ack_flag: char,
    /// 2-character station id.
    pub station_id: String,
    /// 2-character spindle id.
    pub spindle_id: String,
    /// 2-digit link sequence number; `00` or blank means unsequenced.
    pub sequence_number: String,
    /// Number of message parts for linked messages, or space.
    pub message_parts: char,
    /// Part number for linked messages, or space.
    pub message_part_number: char,
}

impl MessageHeader {
    /// Parse a header from exactly 20 ASCII bytes.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::HeaderLength`] if the slice is not 20 bytes
    /// - [`ProtocolError::NonAscii`] on any non-ASCII byte
    /// - [`ProtocolError::InvalidLength`] if the length field has non-digits
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() != HEADER_LEN {
            return Err(ProtocolError::HeaderLength { expected: HEADER_LEN, actual: raw.len() });
        }
        if let Some(offset) = raw.iter().position(|b| !b.is_ascii()) {
            return Err(ProtocolError::NonAscii { byte: raw[offset], offset });
        }

        // All bytes are ASCII, so slicing at fixed offsets cannot split a
        // character boundary.
        let text = String::from_utf8_lossy(raw);
        let length_field = &text[0..4];
        let length: usize = length_field
            .parse()
            .map_err(|_| ProtocolError::InvalidLength(length_field.to_string()))?;

        Ok(Self {
            length,
            mid: text[4..8].to_string(),
            revision: text[8..11].to_string(),
            no_ack_flag: char_at(&text, 11),
            station_id: text[12..14].to_string(),
            spindle_id: text[14..16].to_string(),
            sequence_number: text[16..18].to_string(),
            message_parts: char_at(&text, 18),
            message_part_number: char_at(&text, 19),
        })
    }

    /// Encode the header back to its 20-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let text = format!(
            "{length:04}{mid}{revision}{no_ack}{station}{spindle}{seq}{parts}{part_no}",
            length = self.length.min(9999),
            mid = normalize_mid(&self.mid),
            revision = fit_field(&self.revision, 3),
            no_ack = self.no_ack_flag,
            station = fit_field(&self.station_id, 2),
            spindle = fit_field(&self.spindle_id, 2),
            seq = fit_field(&self.sequence_number, 2),
            parts = self.message_parts,
            part_no = self.message_part_number,
        );
        let mut out = [b' '; HEADER_LEN];
        for (slot, byte) in out.iter_mut().zip(text.bytes()) {
            *slot = byte;
        }
        out
    }

    /// Revision as an integer; blank or non-numeric reads as 0 ("any").
    #[must_use]
    pub fn revision_int(&self) -> u32 {
        self.revision.trim().parse().unwrap_or(0)
    }

    /// Link sequence number as an integer; blank or non-numeric reads as 0.
    #[must_use]
    pub fn sequence_int(&self) -> u8 {
        self.sequence_number.trim().parse().unwrap_or(0)
    }

    /// Whether the frame carries a link-level sequence number (1..=99).
    #[must_use]
    pub fn has_sequence(&self) -> bool {
        let seq = self.sequence_int();
        (1..=99).contains(&seq)
    }
}

/// Right-align a field into `width` characters, keeping the trailing
/// characters when the input is too wide.
fn fit_field(value: &str, width: usize) -> String {
    let padded = format!("{value: >width$}");
    let start = padded.len() - width;
    padded[start..].to_string()
}

fn char_at(text: &str, offset: usize) -> char {
    text.as_bytes().get(offset).map_or(' ', |b| *b as char)
}
