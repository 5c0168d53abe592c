//! Wire traffic records.
//!
//! Every frame the simulator receives or sends is appended to a bounded
//! in-memory ring, so the control plane can replay recent protocol activity
//! without packet capture. Raw bytes are stored lossy-decoded; interior NULs
//! and binary trace bytes become replacement characters.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::{SessionContext, SessionRole};
use opsim_proto::Message;

/// Maximum retained traffic records.
pub const TRAFFIC_CAP: usize = 5000;

/// Direction of a recorded frame, from the simulator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Frame received from the client.
    Rx,
    /// Frame sent to the client.
    Tx,
}

/// One recorded frame.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficRecord {
    /// When the frame was recorded.
    pub timestamp: DateTime<Utc>,
    /// Session the frame belongs to.
    pub session_id: String,
    /// Role of that session.
    pub role: SessionRole,
    /// Receive or transmit.
    pub direction: Direction,
    /// Normalized MID.
    pub mid: String,
    /// Header revision (0 for blank).
    pub revision: u32,
    /// Declared frame length.
    pub length: usize,
    /// Full wire form, lossy-decoded to ASCII.
    pub raw_ascii: String,
    /// Payload, lossy-decoded to ASCII.
    pub decoded_data: String,
}

impl TrafficRecord {
    /// Build a record for a frame on a session.
    #[must_use]
    pub fn capture(session: &SessionContext, direction: Direction, msg: &Message) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session.session_id().to_string(),
            role: session.role(),
            direction,
            mid: msg.mid().to_string(),
            revision: msg.revision(),
            length: msg.header.length,
            raw_ascii: lossy_ascii(&msg.raw),
            decoded_data: msg.data_ascii(),
        }
    }
}

fn lossy_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| if b.is_ascii() && *b != 0 { *b as char } else { '\u{fffd}' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_copies_frame_fields() {
        let session = SessionContext::new(
            "feedfacecafe".to_string(),
            SessionRole::Actor,
            "127.0.0.1:9".to_string(),
        );
        let msg = Message::builder("0061").revision(2).data(&b"010000000002"[..]).build();
        let record = TrafficRecord::capture(&session, Direction::Tx, &msg);

        assert_eq!(record.mid, "0061");
        assert_eq!(record.revision, 2);
        assert_eq!(record.length, 32);
        assert_eq!(record.decoded_data, "010000000002");
        // The trailing NUL is replaced, not dropped.
        assert!(record.raw_ascii.ends_with('\u{fffd}'));
    }
}
