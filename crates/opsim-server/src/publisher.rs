//! Event publisher: inject a logical event and fan it out to subscribers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::session::SharedSessions;
use opsim_core::SimulatorState;

/// Result of publishing one event.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    /// Opaque event id.
    pub event_id: String,
    /// Event type tag.
    pub event_type: String,
    /// Notification MIDs the event affected.
    pub affected_mids: Vec<String>,
    /// Number of push messages actually sent.
    pub pushed_messages: usize,
}

/// Injects events into the state store and pushes notifications to every
/// started session whose subscriptions cover the affected MIDs.
#[derive(Clone)]
pub struct Publisher {
    state: Arc<SimulatorState>,
    shared: Arc<SharedSessions>,
}

impl Publisher {
    pub(crate) fn new(state: Arc<SimulatorState>, shared: Arc<SharedSessions>) -> Self {
        Self { state, shared }
    }

    /// Inject an event, mutate state, and fan out push messages.
    ///
    /// Pushes to a single session are emitted in ascending MID order and
    /// sequence-stamped per that session's acknowledge mode.
    pub async fn publish(&self, event_type: &str, payload: Value) -> PublishOutcome {
        let event = self.state.inject_event(event_type, payload);
        let mut pushed = 0;

        for session in self.state.session_handles() {
            if !session.communication_started() {
                continue;
            }
            let Some(io) = self.shared.get(session.session_id()).await else {
                continue;
            };
            for msg in self.state.generate_push_messages(&session, &event) {
                let stamped = session.stamp_outbound(msg);
                crate::session::send_message(&self.state, &session, &io, stamped).await;
                pushed += 1;
            }
        }

        tracing::debug!(
            "published {event_type} event {} to {pushed} message(s)",
            event.event_id
        );
        PublishOutcome {
            event_id: event.event_id,
            event_type: event.event_type,
            affected_mids: event.affected_mids,
            pushed_messages: pushed,
        }
    }
}
