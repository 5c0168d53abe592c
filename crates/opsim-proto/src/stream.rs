//! Stream buffer draining with resynchronization.
//!
//! TCP delivers an unframed byte stream, so the parser works over an
//! accumulation buffer: it consumes as many complete frames as the buffer
//! holds and leaves partial frames for the next read. Corruption never kills
//! the stream. If the buffer does not start with a plausible length field the
//! parser drops a single byte and tries again, which guarantees recovery at
//! the next aligned frame regardless of what garbage was injected.

use bytes::{Buf, BufMut, BytesMut};

use crate::header::{HEADER_LEN, MessageHeader, NUL};
use crate::message::{Message, TRACE_MID};

/// Drain all complete messages from `buffer`, leaving any remainder.
///
/// Resync rules, applied in a loop:
///
/// 1. Fewer than 4 bytes buffered: stop and wait for more.
/// 2. First 4 bytes are not all ASCII digits: drop one byte, retry.
/// 3. Declared length under 20 (cannot hold a header): drop the 4 length
///    bytes, retry.
/// 4. Fewer than `length` bytes buffered: stop and wait.
/// 5. Header bytes fail to parse despite a numeric length: drop one byte,
///    retry (byte-drop resync instead of stream termination).
/// 6. Otherwise slice the frame; if the next byte is NUL, consume it too
///    (it terminates this frame, it does not start the next one).
#[must_use]
pub fn parse_stream_buffer(buffer: &mut BytesMut) -> Vec<Message> {
    let mut messages = Vec::new();

    loop {
        if buffer.len() < 4 {
            return messages;
        }
        if !buffer[..4].iter().all(u8::is_ascii_digit) {
            buffer.advance(1);
            continue;
        }

        // The length field is pure ASCII digits, checked above.
        let length = ascii_digits_to_usize(&buffer[..4]);
        if length < HEADER_LEN {
            buffer.advance(4);
            continue;
        }
        if buffer.len() < length {
            return messages;
        }

        let Ok(header) = MessageHeader::parse(&buffer[..HEADER_LEN]) else {
            buffer.advance(1);
            continue;
        };

        let frame = buffer.split_to(length).freeze();
        let nul_terminated = buffer.first() == Some(&NUL);
        if nul_terminated {
            buffer.advance(1);
        }

        let data = frame.slice(HEADER_LEN..);
        let raw = if nul_terminated {
            let mut raw = BytesMut::with_capacity(frame.len() + 1);
            raw.put_slice(&frame);
            raw.put_u8(NUL);
            raw.freeze()
        } else {
            frame
        };

        let binary = header.mid == TRACE_MID;
        messages.push(Message { header, data, raw, binary });
    }
}

fn ascii_digits_to_usize(digits: &[u8]) -> usize {
    digits.iter().fold(0usize, |acc, b| acc * 10 + usize::from(b - b'0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_of(bytes: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(bytes);
        buf
    }

    #[test]
    fn single_frame_drains_fully() {
        let msg = Message::builder("0001").revision(1).data(&b"01"[..]).build();
        let mut buf = buffer_of(&msg.raw);

        let parsed = parse_stream_buffer(&mut buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].mid(), "0001");
        assert_eq!(parsed[0].data.as_ref(), b"01");
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits() {
        let msg = Message::builder("9999").build();
        let mut buf = buffer_of(&msg.raw[..10]);

        assert!(parse_stream_buffer(&mut buf).is_empty());
        assert_eq!(buf.len(), 10);

        buf.put_slice(&msg.raw[10..]);
        let parsed = parse_stream_buffer(&mut buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].mid(), "9999");
    }

    #[test]
    fn garbage_prefix_resyncs() {
        let msg = Message::builder("0003").build();
        let mut buf = buffer_of(b"XXXX");
        buf.put_slice(&msg.raw);

        let parsed = parse_stream_buffer(&mut buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].mid(), "0003");
        assert!(buf.is_empty());
    }

    #[test]
    fn undersized_length_field_is_skipped() {
        let msg = Message::builder("9999").build();
        let mut buf = buffer_of(b"0004");
        buf.put_slice(&msg.raw);

        let parsed = parse_stream_buffer(&mut buf);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].mid(), "9999");
    }

    #[test]
    fn back_to_back_frames_parse_in_order() {
        let first = Message::builder("0001").data(&b"01"[..]).build();
        let second = Message::builder("9999").build();
        let mut buf = buffer_of(&first.raw);
        buf.put_slice(&second.raw);

        let parsed = parse_stream_buffer(&mut buf);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].mid(), "0001");
        assert_eq!(parsed[1].mid(), "9999");
        assert!(buf.is_empty());
    }

    #[test]
    fn trace_frame_keeps_interior_nul_and_has_no_terminator() {
        let payload = b"01TRACE020004\x00\x0a\x0b\x0c\x0d".to_vec();
        let msg = Message::builder("0900").data(payload.clone()).build();
        let mut buf = buffer_of(&msg.raw);

        let parsed = parse_stream_buffer(&mut buf);
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].binary);
        assert_eq!(parsed[0].data.as_ref(), payload.as_slice());
        assert!(buf.is_empty());
    }

    #[test]
    fn nul_between_frames_belongs_to_the_first() {
        let first = Message::builder("0005").data(&b"0001"[..]).build();
        let second = Message::builder("0005").data(&b"0003"[..]).build();
        let mut buf = buffer_of(&first.raw);
        buf.put_slice(&second.raw);

        let parsed = parse_stream_buffer(&mut buf);
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].has_trailing_nul());
        assert!(parsed[1].has_trailing_nul());
    }
}
