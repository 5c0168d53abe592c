//! Per-connection session context and link-layer state machine.
//!
//! A [`SessionContext`] is shared between the connection's read loop, the
//! event publisher, and the keep-alive watchdog, so its mutable protocol
//! state sits behind a leaf mutex: accessors lock briefly and never take any
//! other lock, which keeps the store → session lock order acyclic.
//!
//! The link layer distinguishes two acknowledge modes. Sessions start in
//! application mode (plain 0005/0004 replies). The first inbound frame
//! carrying a non-zero sequence number upgrades the session to link-level
//! mode: every accepted frame is confirmed with 9997, duplicates replay the
//! remembered ack, and out-of-sequence frames are rejected with 9998.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ErrorCode;
use opsim_proto::{Message, format_mid_error_payload, next_sequence, normalize_mid, with_sequence};

/// Positive link-level acknowledge MID.
pub const LINK_ACK_MID: &str = "9997";

/// Negative link-level acknowledge MID.
pub const LINK_NACK_MID: &str = "9998";

/// Session role, fixed by the TCP port the client connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    /// Unconstrained integrator connection.
    Classic,
    /// Authoritative writer; at most one actor may hold a started session.
    Actor,
    /// Read-only observer.
    Viewer,
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classic => write!(f, "classic"),
            Self::Actor => write!(f, "actor"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

/// Acknowledge mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Application-level replies only; no sequence numbers.
    Application,
    /// Sequence-numbered frames confirmed with 9997/9998.
    LinkLevel,
}

/// Mutable link-layer and subscription state, guarded by the leaf mutex.
#[derive(Debug)]
struct LinkState {
    ack_mode: AckMode,
    next_tx_seq: u8,
    next_rx_seq: u8,
    last_rx_seq: u8,
    last_link_ack: Option<Message>,
    communication_started: bool,
    subscriptions: BTreeSet<String>,
    last_activity: DateTime<Utc>,
}

impl LinkState {
    fn fresh() -> Self {
        Self {
            ack_mode: AckMode::Application,
            next_tx_seq: 1,
            next_rx_seq: 1,
            last_rx_seq: 0,
            last_link_ack: None,
            communication_started: false,
            subscriptions: BTreeSet::new(),
            last_activity: Utc::now(),
        }
    }
}

/// One TCP session of the simulator.
#[derive(Debug)]
pub struct SessionContext {
    session_id: String,
    role: SessionRole,
    remote: String,
    created_at: DateTime<Utc>,
    link: Mutex<LinkState>,
}

/// Outcome of running a frame through the link-layer state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Whether the frame should go on to the dispatcher.
    pub dispatch: bool,
    /// Link acknowledge (9997/9998) to send first, already sequenced.
    pub ack: Option<Message>,
}

impl SessionContext {
    /// Create a session with fresh link state.
    #[must_use]
    pub fn new(session_id: String, role: SessionRole, remote: String) -> Self {
        Self { session_id, role, remote, created_at: Utc::now(), link: Mutex::new(LinkState::fresh()) }
    }

    /// Opaque session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Role carried by the accepting port.
    #[must_use]
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Remote peer address.
    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// When the connection was accepted.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record activity now (any inbound bytes or dispatched frame).
    pub fn touch(&self) {
        self.lock().last_activity = Utc::now();
    }

    /// Most recent activity timestamp.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.lock().last_activity
    }

    /// Current acknowledge mode.
    #[must_use]
    pub fn ack_mode(&self) -> AckMode {
        self.lock().ack_mode
    }

    /// Whether MID 0001 has established this session.
    #[must_use]
    pub fn communication_started(&self) -> bool {
        self.lock().communication_started
    }

    /// Set or clear the communication-started flag.
    pub fn set_communication_started(&self, started: bool) {
        self.lock().communication_started = started;
    }

    /// Sorted copy of the current subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> BTreeSet<String> {
        self.lock().subscriptions.clone()
    }

    /// Subscribe to a MID (normalized).
    pub fn subscribe(&self, mid: &str) {
        self.lock().subscriptions.insert(normalize_mid(mid));
    }

    /// Drop a subscription (normalized); unknown targets are ignored.
    pub fn unsubscribe(&self, mid: &str) {
        self.lock().subscriptions.remove(&normalize_mid(mid));
    }

    /// Clear all subscriptions (communication stop).
    pub fn clear_subscriptions(&self) {
        self.lock().subscriptions.clear();
    }

    /// Run an inbound frame through the link-layer rules.
    ///
    /// Frames without a sequence number keep the session in application mode
    /// and always dispatch. Sequenced frames upgrade to link-level mode:
    ///
    /// - expected sequence: advance the receive counter, answer 9997 (payload
    ///   is the inbound MID, sequence is the newly advanced counter) and
    ///   dispatch;
    /// - duplicate of the previous sequence: replay the remembered ack and
    ///   skip dispatch;
    /// - anything else: answer 9998 with error 03 at the expected sequence
    ///   and skip dispatch. Retransmission is the client's problem.
    pub fn resolve_link_ack(&self, msg: &Message) -> LinkOutcome {
        let mut link = self.lock();

        if !msg.header.has_sequence() {
            link.ack_mode = AckMode::Application;
            return LinkOutcome { dispatch: true, ack: None };
        }

        link.ack_mode = AckMode::LinkLevel;
        let seq = msg.header.sequence_int();
        let expected = link.next_rx_seq;

        if seq == expected {
            let advanced = next_sequence(expected);
            link.next_rx_seq = advanced;
            link.last_rx_seq = seq;
            let ack = Message::builder(LINK_ACK_MID)
                .data(normalize_mid(msg.mid()).into_bytes())
                .revision(1)
                .sequence(advanced)
                .build();
            link.last_link_ack = Some(ack.clone());
            return LinkOutcome { dispatch: true, ack: Some(ack) };
        }

        if seq == link.last_rx_seq {
            if let Some(ack) = link.last_link_ack.clone() {
                return LinkOutcome { dispatch: false, ack: Some(ack) };
            }
        }

        let nack = Message::builder(LINK_NACK_MID)
            .data(format_mid_error_payload(msg.mid(), ErrorCode::InvalidSequence.code()))
            .revision(1)
            .sequence(expected)
            .build();
        link.last_link_ack = Some(nack.clone());
        LinkOutcome { dispatch: false, ack: Some(nack) }
    }

    /// Stamp an outbound message with the transmit sequence counter.
    ///
    /// In application mode messages pass through untouched. In link-level
    /// mode the sequence field is replaced with `next_tx_seq`, which then
    /// advances. Link acks (9997/9998) carry their own sequence and are
    /// exempt.
    #[must_use]
    pub fn stamp_outbound(&self, msg: Message) -> Message {
        let mut link = self.lock();
        if link.ack_mode != AckMode::LinkLevel {
            return msg;
        }
        if msg.mid() == LINK_ACK_MID || msg.mid() == LINK_NACK_MID {
            return msg;
        }
        let seq = link.next_tx_seq;
        link.next_tx_seq = next_sequence(seq);
        with_sequence(&msg, seq)
    }

    /// Reinstall fresh protocol state (simulator reset): communication
    /// stopped, subscriptions cleared, both sequence counters back to 1.
    pub fn reset_protocol(&self) {
        let mut link = self.lock();
        let last_activity = link.last_activity;
        *link = LinkState::fresh();
        link.last_activity = last_activity;
    }

    /// Snapshot of this session for the control plane.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let link = self.lock();
        SessionSnapshot {
            session_id: self.session_id.clone(),
            role: self.role,
            remote: self.remote.clone(),
            created_at: self.created_at,
            last_activity: link.last_activity,
            ack_mode: link.ack_mode,
            next_tx_seq: link.next_tx_seq,
            next_rx_seq: link.next_rx_seq,
            communication_started: link.communication_started,
            subscriptions: link.subscriptions.iter().cloned().collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Copy of a session's observable state.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Opaque session identifier.
    pub session_id: String,
    /// Session role.
    pub role: SessionRole,
    /// Remote peer address.
    pub remote: String,
    /// When the connection was accepted.
    pub created_at: DateTime<Utc>,
    /// Most recent activity.
    pub last_activity: DateTime<Utc>,
    /// Acknowledge mode.
    pub ack_mode: AckMode,
    /// Next transmit sequence number.
    pub next_tx_seq: u8,
    /// Next expected receive sequence number.
    pub next_rx_seq: u8,
    /// Whether MID 0001 has established the session.
    pub communication_started: bool,
    /// Sorted subscriptions.
    pub subscriptions: Vec<String>,
}
