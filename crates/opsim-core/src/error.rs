//! Error types for the simulator core.
//!
//! Two distinct layers: [`ErrorCode`] is the wire-observable taxonomy that
//! rides in MID 0004 replies, while [`CoreError`] covers host-side failures
//! (data files, unknown domains, session limits) that never reach the wire.

use thiserror::Error;

/// Wire-observable error codes, signaled as MID 0004 with `<mid><nn>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 03 — invalid link-level sequence number.
    InvalidSequence,
    /// 16 — too many sessions.
    TooManySessions,
    /// 35 — an actor session is already connected.
    ActorAlreadyConnected,
    /// 73 — subscription target unknown.
    SubscriptionTargetUnknown,
    /// 74 — subscription revision unsupported.
    SubscriptionRevisionUnsupported,
    /// 75 — request target unknown or unsupported.
    RequestTargetUnknown,
    /// 79 — MID not supported by this controller profile.
    MidNotSupported,
    /// 92 — command disabled because another actor holds control.
    CommandDisabledByActor,
    /// 97 — communication not started (or started twice).
    CommunicationNotStarted,
    /// 98 — unsupported MID revision.
    RevisionUnsupported,
    /// 99 — MID not recognized at all.
    MidNotRecognized,
}

impl ErrorCode {
    /// Two-digit wire value.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::InvalidSequence => 3,
            Self::TooManySessions => 16,
            Self::ActorAlreadyConnected => 35,
            Self::SubscriptionTargetUnknown => 73,
            Self::SubscriptionRevisionUnsupported => 74,
            Self::RequestTargetUnknown => 75,
            Self::MidNotSupported => 79,
            Self::CommandDisabledByActor => 92,
            Self::CommunicationNotStarted => 97,
            Self::RevisionUnsupported => 98,
            Self::MidNotRecognized => 99,
        }
    }
}

/// Host-side errors from the simulator core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A state domain name that does not exist.
    #[error("unknown state domain: {0}")]
    UnknownDomain(String),

    /// A profile name that does not exist.
    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    /// No profile definitions were found at startup.
    #[error("no profiles found in {0}")]
    NoProfiles(String),

    /// The session registry is full.
    #[error("session limit reached ({0} active)")]
    SessionLimit(usize),

    /// Data file could not be read.
    #[error("failed to read data file")]
    Io(#[from] std::io::Error),

    /// Data file could not be parsed.
    #[error("failed to parse data file")]
    Json(#[from] serde_json::Error),
}
