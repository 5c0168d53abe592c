//! Simulation events and the subscription-target tables.
//!
//! A logical event (a tightening, an alarm, an I/O edge, a trace) maps to
//! the set of notification MIDs it affects. Sessions opt into notifications
//! through subscription MIDs; [`subscription_targets`] maps each
//! subscription MID to the MIDs it delivers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use opsim_proto::normalize_mid;

/// Maximum retained simulation events.
pub const EVENT_CAP: usize = 2000;

/// One injected event.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationEvent {
    /// Opaque event id.
    pub event_id: String,
    /// When the event was injected.
    pub timestamp: DateTime<Utc>,
    /// Free event tag (`tightening`, `alarm`, `io_change`, `trace`, ...).
    pub event_type: String,
    /// Arbitrary payload supplied by the injector.
    pub payload: serde_json::Value,
    /// Notification MIDs this event affects.
    pub affected_mids: Vec<String>,
}

/// Default affected MIDs per event type, used when the payload does not name
/// its own `mids` list.
#[must_use]
pub fn default_event_mids(event_type: &str) -> Vec<String> {
    let mids: &[&str] = match event_type {
        "tightening" => &["0061", "1201", "1202"],
        "alarm" => &["0071", "1000"],
        "io_change" => &["0211", "0217", "0221"],
        "trace" => &["0900"],
        _ => &[],
    };
    mids.iter().map(|m| (*m).to_string()).collect()
}

/// Notification MIDs delivered by a subscription MID.
///
/// A subscription also targets itself, so generic subscriptions made via
/// MID 0008 on a data MID deliver that MID directly; callers must union the
/// result with the subscribed MID.
#[must_use]
pub fn subscription_targets(sub_mid: &str) -> &'static [&'static str] {
    match normalize_mid(sub_mid).as_str() {
        "0014" => &["0015"],
        "0021" => &["0022"],
        "0034" => &["0035"],
        "0051" => &["0052"],
        "0060" => &["0061"],
        "0070" => &["0071"],
        "0090" => &["0091"],
        "0100" => &["0101"],
        "0105" => &["0106", "0107"],
        "0120" => &["0121", "0122", "0123", "0124"],
        "0151" => &["0152"],
        "0210" => &["0211"],
        "0216" => &["0217"],
        "0220" => &["0221"],
        "0241" => &["0242"],
        "0250" => &["0251"],
        "0261" => &["0262"],
        "0400" => &["0401"],
        "0420" => &["0421"],
        "0500" => &["0501"],
        "0901" => &["0900"],
        "8000" => &["8001"],
        _ => &[],
    }
}
