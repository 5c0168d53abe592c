//! Fuzz target for the stream parser.
//!
//! Feeds arbitrary byte sequences into `parse_stream_buffer` to find:
//! - Parser crashes or panics
//! - Infinite loops (a buffer that never shrinks and never returns)
//! - Frames whose declared length disagrees with the consumed bytes
//!
//! The parser must NEVER panic: garbage is handled by byte-drop
//! resynchronization, not errors.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use opsim_proto::parse_stream_buffer;

fuzz_target!(|data: &[u8]| {
    let mut buffer = BytesMut::from(data);
    let messages = parse_stream_buffer(&mut buffer);

    for msg in &messages {
        // Declared length always covers the header and exactly the payload.
        assert!(msg.header.length >= 20);
        assert_eq!(msg.header.length, 20 + msg.data.len());
    }
});
