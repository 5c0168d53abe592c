//! Fuzz target for chunked delivery.
//!
//! TCP can split a frame at any byte. Splitting the same input into
//! arbitrary chunks and draining after each one must yield exactly the same
//! frames as parsing the whole buffer at once.

#![no_main]

use arbitrary::Arbitrary;
use bytes::{BufMut, BytesMut};
use libfuzzer_sys::fuzz_target;
use opsim_proto::parse_stream_buffer;

#[derive(Debug, Arbitrary)]
struct ChunkedInput {
    data: Vec<u8>,
    cuts: Vec<u8>,
}

fuzz_target!(|input: ChunkedInput| {
    let mut whole = BytesMut::from(input.data.as_slice());
    let expected = parse_stream_buffer(&mut whole);

    let mut buffer = BytesMut::new();
    let mut collected = Vec::new();
    let mut offset = 0;
    for cut in input.cuts {
        let end = (offset + usize::from(cut)).min(input.data.len());
        buffer.put_slice(&input.data[offset..end]);
        collected.extend(parse_stream_buffer(&mut buffer));
        offset = end;
    }
    buffer.put_slice(&input.data[offset..]);
    collected.extend(parse_stream_buffer(&mut buffer));

    assert_eq!(collected.len(), expected.len());
    for (got, want) in collected.iter().zip(&expected) {
        assert_eq!(got.mid(), want.mid());
        assert_eq!(got.data, want.data);
    }
});
