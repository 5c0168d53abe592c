//! Message type combining header and payload.
//!
//! A [`Message`] is the application-layer unit: the parsed 20-byte header,
//! the payload bytes, and the exact wire form (`raw`) including the trailing
//! NUL when one is present. ASCII messages end with a single NUL that is not
//! counted in the header length. MID `0900` is the one exception: its payload
//! carries raw trace bytes and the frame is emitted without a trailing NUL.

use bytes::{BufMut, Bytes, BytesMut};

use crate::header::{HEADER_LEN, MessageHeader, NUL, normalize_mid};

/// The MID whose payload is binary and whose frame carries no trailing NUL.
pub const TRACE_MID: &str = "0900";

/// A complete Open Protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Parsed header.
    pub header: MessageHeader,
    /// Payload bytes (everything after the 20-byte header).
    pub data: Bytes,
    /// Exact bytes as sent or received, trailing NUL included when present.
    pub raw: Bytes,
    /// True iff this is the binary trace MID `0900`.
    pub binary: bool,
}

impl Message {
    /// Start building a message for `mid` with default header fields.
    #[must_use]
    pub fn builder(mid: &str) -> MessageBuilder {
        MessageBuilder::new(mid)
    }

    /// Normalized 4-digit MID.
    #[must_use]
    pub fn mid(&self) -> &str {
        &self.header.mid
    }

    /// Header revision as an integer (0 for blank).
    #[must_use]
    pub fn revision(&self) -> u32 {
        self.header.revision_int()
    }

    /// Payload decoded as ASCII, with non-ASCII bytes replaced.
    #[must_use]
    pub fn data_ascii(&self) -> String {
        self.data.iter().map(|b| if b.is_ascii() { *b as char } else { '\u{fffd}' }).collect()
    }

    /// Whether the wire form ends with the NUL terminator.
    #[must_use]
    pub fn has_trailing_nul(&self) -> bool {
        self.raw.last() == Some(&NUL)
    }
}

/// Builder for [`Message`] with the protocol's default header fields.
///
/// Defaults: revision 1, no link sequence, space-filled station/spindle and
/// part fields, trailing NUL appended. Building the trace MID `0900` flips
/// the binary flag and suppresses the NUL automatically.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    mid: String,
    data: Bytes,
    revision: String,
    no_ack_flag: char,
    station_id: String,
    spindle_id: String,
    sequence_number: String,
    message_parts: char,
    message_part_number: char,
    append_nul: bool,
}

impl MessageBuilder {
    /// Create a builder for `mid` (normalized) with default header fields.
    #[must_use]
    pub fn new(mid: &str) -> Self {
        let mid = normalize_mid(mid);
        let append_nul = mid != TRACE_MID;
        Self {
            mid,
            data: Bytes::new(),
            revision: "001".to_string(),
            no_ack_flag: ' ',
            station_id: "  ".to_string(),
            spindle_id: "  ".to_string(),
            sequence_number: "00".to_string(),
            message_parts: ' ',
            message_part_number: ' ',
            append_nul,
        }
    }

    /// Set the payload bytes.
    #[must_use]
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Set the revision from an integer (encoded as 3 zero-padded digits).
    #[must_use]
    pub fn revision(mut self, revision: u32) -> Self {
        self.revision = format!("{revision:03}");
        self
    }

    /// Set the raw 3-character revision field, e.g. to echo blank revisions.
    #[must_use]
    pub fn revision_field(mut self, revision: &str) -> Self {
        self.revision = fit_right(revision, 3);
        self
    }

    /// Set the link sequence number (0 encodes as `00`, "no sequence").
    #[must_use]
    pub fn sequence(mut self, seq: u8) -> Self {
        self.sequence_number = format!("{seq:02}");
        self
    }

    /// Set the no-ack flag character.
    #[must_use]
    pub fn no_ack_flag(mut self, flag: char) -> Self {
        self.no_ack_flag = flag;
        self
    }

    /// Set the 2-character station id field.
    #[must_use]
    pub fn station_id(mut self, station_id: &str) -> Self {
        self.station_id = fit_right(station_id, 2);
        self
    }

    /// Set the 2-character spindle id field.
    #[must_use]
    pub fn spindle_id(mut self, spindle_id: &str) -> Self {
        self.spindle_id = fit_right(spindle_id, 2);
        self
    }

    /// Set the linked-message part fields.
    #[must_use]
    pub fn parts(mut self, message_parts: char, message_part_number: char) -> Self {
        self.message_parts = message_parts;
        self.message_part_number = message_part_number;
        self
    }

    /// Suppress the trailing NUL regardless of MID.
    #[must_use]
    pub fn no_nul(mut self) -> Self {
        self.append_nul = false;
        self
    }

    /// Build the message, computing `length = 20 + data.len()`.
    #[must_use]
    pub fn build(self) -> Message {
        let binary = self.mid == TRACE_MID;
        let header = MessageHeader {
            length: HEADER_LEN + self.data.len(),
            mid: self.mid,
            revision: self.revision,
            no_ack_flag: self.no_ack_flag,
            station_id: self.station_id,
            spindle_id: self.spindle_id,
            sequence_number: self.sequence_number,
            message_parts: self.message_parts,
            message_part_number: self.message_part_number,
        };

        let mut raw = BytesMut::with_capacity(header.length + 1);
        raw.put_slice(&header.encode());
        raw.put_slice(&self.data);
        if self.append_nul {
            raw.put_u8(NUL);
        }

        Message { header, data: self.data, raw: raw.freeze(), binary }
    }
}

/// Restamp a message with a new link sequence number, preserving every other
/// header field and the NUL discipline of the original wire form.
#[must_use]
pub fn with_sequence(msg: &Message, seq: u8) -> Message {
    let mut builder = Message::builder(msg.mid())
        .data(msg.data.clone())
        .revision_field(&msg.header.revision)
        .sequence(seq)
        .no_ack_flag(msg.header.no_ack_flag)
        .station_id(&msg.header.station_id)
        .spindle_id(&msg.header.spindle_id)
        .parts(msg.header.message_parts, msg.header.message_part_number);
    if !msg.has_trailing_nul() {
        builder = builder.no_nul();
    }
    builder.build()
}

fn fit_right(value: &str, width: usize) -> String {
    let padded = format!("{value: >width$}");
    let start = padded.len() - width;
    padded[start..].to_string()
}
