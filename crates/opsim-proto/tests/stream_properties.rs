//! Property-based tests for the stream codec.
//!
//! These verify the framing invariants for ALL inputs, not just examples:
//! build→parse is identity, prefixes of a frame never produce output, and
//! the parser resynchronizes after arbitrary garbage.

use bytes::{BufMut, BytesMut};
use opsim_proto::{Message, next_sequence, normalize_mid, parse_stream_buffer};
use proptest::prelude::*;

/// Strategy for 1-5 character numeric MID inputs (pre-normalization).
fn arbitrary_mid() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[0-9]{1,5}").unwrap_or_else(|_| unreachable!("valid regex"))
}

/// Strategy for printable-ASCII payloads up to 256 bytes.
fn arbitrary_data() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0x20u8..0x7f, 0..256)
}

fn arbitrary_message() -> impl Strategy<Value = Message> {
    (arbitrary_mid(), arbitrary_data(), 0u32..1000, 0u8..=99).prop_map(
        |(mid, data, revision, seq)| {
            Message::builder(&mid).data(data).revision(revision).sequence(seq).build()
        },
    )
}

#[test]
fn prop_build_parse_round_trip() {
    proptest!(|(msg in arbitrary_message())| {
        let mut buf = BytesMut::new();
        buf.put_slice(&msg.raw);

        let parsed = parse_stream_buffer(&mut buf);
        prop_assert_eq!(parsed.len(), 1, "exactly one message expected");
        prop_assert!(buf.is_empty(), "buffer must be fully drained");

        let got = &parsed[0];
        prop_assert_eq!(got.mid(), msg.mid());
        prop_assert_eq!(got.revision(), msg.revision());
        prop_assert_eq!(got.header.sequence_int(), msg.header.sequence_int());
        prop_assert_eq!(got.data.as_ref(), msg.data.as_ref());
        prop_assert_eq!(got.raw.as_ref(), msg.raw.as_ref());
    });
}

#[test]
fn prop_prefix_yields_nothing_and_retains_bytes() {
    proptest!(|(msg in arbitrary_message(), cut in 0usize..16)| {
        // Any strict prefix of the frame (NUL excluded so the cut always
        // lands inside the counted length).
        let frame_len = msg.header.length;
        let keep = frame_len.saturating_sub(1 + cut % frame_len);
        let mut buf = BytesMut::new();
        buf.put_slice(&msg.raw[..keep]);

        let parsed = parse_stream_buffer(&mut buf);
        prop_assert!(parsed.is_empty(), "prefix must not parse");
        prop_assert_eq!(buf.len(), keep, "prefix bytes must be retained");
    });
}

#[test]
fn prop_resync_after_garbage_prefix() {
    proptest!(|(
        msg in arbitrary_message(),
        // Digit-free garbage: a stray digit run could form a plausible
        // length field that swallows the real frame, which is a stream the
        // protocol cannot distinguish from a huge frame in transit.
        garbage in prop::collection::vec(
            any::<u8>().prop_filter("non-digit", |b| !b.is_ascii_digit()),
            1..32,
        ),
    )| {
        let mut buf = BytesMut::new();
        buf.put_slice(&garbage);
        buf.put_slice(&msg.raw);

        let parsed = parse_stream_buffer(&mut buf);
        prop_assert_eq!(parsed.len(), 1, "exactly the real frame must survive resync");
        prop_assert_eq!(parsed[0].mid(), msg.mid());
        prop_assert_eq!(parsed[0].data.as_ref(), msg.data.as_ref());
        prop_assert!(buf.is_empty());
    });
}

#[test]
fn prop_next_sequence_stays_in_range() {
    proptest!(|(seq in 1u8..=99)| {
        let next = next_sequence(seq);
        prop_assert!((1..=99).contains(&next));
        if seq == 99 {
            prop_assert_eq!(next, 1);
        } else {
            prop_assert_eq!(next, seq + 1);
        }
    });
}

#[test]
fn prop_normalize_mid_is_idempotent_four_digits() {
    proptest!(|(mid in arbitrary_mid())| {
        let once = normalize_mid(&mid);
        prop_assert_eq!(once.len(), 4);
        prop_assert!(once.bytes().all(|b| b.is_ascii_digit()));
        prop_assert_eq!(normalize_mid(&once), once);
    });
}

#[test]
fn prop_length_field_counts_header_plus_data() {
    proptest!(|(msg in arbitrary_message())| {
        prop_assert_eq!(msg.header.length, 20 + msg.data.len());
        let declared = std::str::from_utf8(&msg.raw[..4]).expect("length field is ASCII");
        prop_assert_eq!(declared.parse::<usize>().ok(), Some(msg.header.length));
    });
}
