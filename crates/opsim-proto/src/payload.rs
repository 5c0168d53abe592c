//! Payload construction helpers.
//!
//! Open Protocol payloads are concatenations of fixed-width ASCII fields,
//! usually introduced by two-digit parameter labels (`"01<value>02<value>"`).
//! These helpers cover the three encodings the simulator needs: zero-padded
//! integers, space-padded left-justified text, and the variable data field
//! list used by result messages.

use bytes::Bytes;

use crate::header::normalize_mid;

/// Zero-pad an integer to `width` digits.
#[must_use]
pub fn zero_pad_int(value: u64, width: usize) -> String {
    format!("{value:0width$}")
}

/// Left-justify `value` into exactly `width` characters, truncating when too
/// long.
#[must_use]
pub fn fit_left(value: &str, width: usize) -> String {
    let mut out = format!("{value:<width$}");
    out.truncate(width);
    out
}

/// Right-align `value` into exactly `width` characters with zero padding,
/// keeping the trailing characters when too long.
#[must_use]
pub fn fit_right_zero(value: &str, width: usize) -> String {
    let padded = format!("{value:0>width$}");
    let start = padded.len() - width;
    padded[start..].to_string()
}

/// Concatenate ASCII parts into payload bytes.
#[must_use]
pub fn ascii_payload(parts: &[&str]) -> Bytes {
    Bytes::from(parts.concat().into_bytes())
}

/// Payload of the generic application acknowledge (MID 0005): the 4-digit
/// MID being acknowledged.
#[must_use]
pub fn format_mid_ack_payload(mid: &str) -> Bytes {
    Bytes::from(normalize_mid(mid).into_bytes())
}

/// Payload of the error reply (MID 0004): `<mid(4)><error_code(2)>`.
#[must_use]
pub fn format_mid_error_payload(mid: &str, code: u8) -> Bytes {
    Bytes::from(format!("{}{code:02}", normalize_mid(mid)).into_bytes())
}

/// One entry of a variable data field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableField {
    /// Parameter id, encoded as 5 digits.
    pub pid: u32,
    /// Two-character data type code.
    pub data_type: String,
    /// Three-character unit code.
    pub unit: String,
    /// Step number, encoded as 4 zero-padded characters.
    pub step_no: String,
    /// Field value; its byte length becomes the 3-digit length unless
    /// overridden.
    pub value: String,
    /// Optional explicit 3-character length field.
    pub length_override: Option<String>,
}

/// Encode a variable data field list: a 3-digit field count followed by
/// `pid(5) + len(3) + type(2) + unit(3) + step(4) + value` per field.
#[must_use]
pub fn encode_variable_fields(fields: &[VariableField]) -> Bytes {
    let mut out = zero_pad_int(fields.len() as u64, 3).into_bytes();
    for field in fields {
        let value_bytes: Vec<u8> = field.value.bytes().filter(u8::is_ascii).collect();
        let length = field
            .length_override
            .clone()
            .unwrap_or_else(|| zero_pad_int(value_bytes.len() as u64, 3));
        out.extend_from_slice(zero_pad_int(u64::from(field.pid), 5).as_bytes());
        out.extend_from_slice(length.as_bytes());
        out.extend_from_slice(fit_right_space(&field.data_type, 2).as_bytes());
        out.extend_from_slice(fit_right_space(&field.unit, 3).as_bytes());
        out.extend_from_slice(fit_right_zero(&field.step_no, 4).as_bytes());
        out.extend_from_slice(&value_bytes);
    }
    Bytes::from(out)
}

fn fit_right_space(value: &str, width: usize) -> String {
    let padded = format!("{value: >width$}");
    let start = padded.len() - width;
    padded[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pad_widths() {
        assert_eq!(zero_pad_int(7, 3), "007");
        assert_eq!(zero_pad_int(1234, 3), "1234");
    }

    #[test]
    fn fit_left_pads_and_truncates() {
        assert_eq!(fit_left("OK", 3), "OK ");
        assert_eq!(fit_left("Simulated alarm text overflowing", 10), "Simulated ");
    }

    #[test]
    fn error_payload_shape() {
        assert_eq!(format_mid_error_payload("1", 99).as_ref(), b"000199");
        assert_eq!(format_mid_error_payload("0001", 35).as_ref(), b"000135");
    }

    #[test]
    fn ack_payload_shape() {
        assert_eq!(format_mid_ack_payload("60").as_ref(), b"0060");
    }

    #[test]
    fn variable_fields_layout() {
        let fields = vec![VariableField {
            pid: 2,
            data_type: "I".to_string(),
            unit: "Nm".to_string(),
            step_no: "1".to_string(),
            value: "1234".to_string(),
            length_override: None,
        }];
        let encoded = encode_variable_fields(&fields);
        assert_eq!(encoded.as_ref(), b"00100002004 I Nm00011234");
    }

    #[test]
    fn variable_fields_empty_list() {
        assert_eq!(encode_variable_fields(&[]).as_ref(), b"000");
    }
}
