//! Open Protocol wire format.
//!
//! The application layer frames fixed-header ASCII messages over a raw TCP
//! stream: a 20-byte header at fixed offsets, a payload of labelled
//! fixed-width fields, and a single NUL terminator that is excluded from the
//! declared length. This crate owns everything about those bytes and nothing
//! about I/O:
//!
//! - [`MessageHeader`]: the 20-byte header with lenient numeric accessors
//! - [`Message`] / [`MessageBuilder`]: building frames with correct length
//!   and NUL discipline (the binary trace MID `0900` carries no NUL)
//! - [`parse_stream_buffer`]: draining complete frames from an accumulation
//!   buffer with single-byte resynchronization after corruption
//! - payload helpers for zero-padded, space-padded, and variable data fields
//!
//! Sessions, dispatch rules, and subscriptions live in `opsim-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod header;
mod message;
mod payload;
mod stream;

pub use errors::{ProtocolError, Result};
pub use header::{HEADER_LEN, MessageHeader, NUL, next_sequence, normalize_mid};
pub use message::{Message, MessageBuilder, TRACE_MID, with_sequence};
pub use payload::{
    VariableField, ascii_payload, encode_variable_fields, fit_left, fit_right_zero,
    format_mid_ack_payload, format_mid_error_payload, zero_pad_int,
};
pub use stream::parse_stream_buffer;
