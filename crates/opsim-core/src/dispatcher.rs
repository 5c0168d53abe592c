//! The MID dispatcher: `(session, inbound) → outbound replies`.
//!
//! A pure pipeline over the current session and state, with the protocol
//! rules evaluated in a fixed order: catalog check, profile check, revision
//! check, communication-start gate, then per-MID and per-category handling.
//! Dynamic dispatch is deliberately table-driven (small static maps keyed by
//! MID) rather than polymorphic; the MID space is small and stable.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::catalog::MidCategory;
use crate::error::ErrorCode;
use crate::session::{SessionContext, SessionRole};
use crate::state::SimulatorState;
use opsim_proto::{
    Message, ascii_payload, fit_left, format_mid_ack_payload, format_mid_error_payload,
};

/// Error reply MID.
pub const ERROR_MID: &str = "0004";

/// Generic application acknowledge MID.
pub const ACK_MID: &str = "0005";

/// Static request → reply mapping for pairs that do not follow the
/// `mid + 1` convention (plus a few that do, kept explicit for clarity).
fn request_reply(mid: &str) -> Option<&'static str> {
    match mid {
        "0010" => Some("0011"),
        "0012" => Some("0013"),
        "0030" => Some("0031"),
        "0032" => Some("0033"),
        "0040" => Some("0041"),
        "0050" => Some("0052"),
        "0064" => Some("0065"),
        "0080" => Some("0081"),
        "0214" => Some("0215"),
        "0260" => Some("0262"),
        "0300" => Some("0301"),
        "0410" => Some("0411"),
        "2600" => Some("2601"),
        "2602" => Some("2603"),
        _ => None,
    }
}

/// Routes inbound messages to replies and state mutations.
pub struct Dispatcher {
    state: Arc<SimulatorState>,
}

impl Dispatcher {
    /// Create a dispatcher over the shared state.
    #[must_use]
    pub fn new(state: Arc<SimulatorState>) -> Self {
        Self { state }
    }

    /// The shared simulator state.
    #[must_use]
    pub fn state(&self) -> &Arc<SimulatorState> {
        &self.state
    }

    /// Dispatch one inbound frame, producing zero or more replies.
    #[must_use]
    pub fn dispatch(&self, session: &SessionContext, msg: &Message) -> Vec<Message> {
        session.touch();
        let mid = msg.mid().to_string();

        let Some(definition) = self.state.catalog().get(&mid) else {
            return vec![error_reply(&mid, ErrorCode::MidNotRecognized)];
        };
        let category = definition.category;

        if !self.state.is_mid_supported(&mid) {
            let code = match category {
                MidCategory::SubscriptionStart => ErrorCode::SubscriptionTargetUnknown,
                MidCategory::Request => ErrorCode::RequestTargetUnknown,
                _ => ErrorCode::MidNotSupported,
            };
            return vec![error_reply(&mid, code)];
        }

        let revision = msg.revision();
        if revision != 0 && !self.state.effective_revisions(&mid).contains(&revision) {
            let code = if category == MidCategory::SubscriptionStart {
                ErrorCode::SubscriptionRevisionUnsupported
            } else {
                ErrorCode::RevisionUnsupported
            };
            return vec![error_reply(&mid, code)];
        }

        if mid != "0001" && !session.communication_started() {
            return vec![error_reply(&mid, ErrorCode::CommunicationNotStarted)];
        }

        match mid.as_str() {
            "0001" => self.handle_communication_start(session),
            "0003" => {
                session.set_communication_started(false);
                session.clear_subscriptions();
                vec![ack_reply(&mid)]
            },
            "9999" => {
                // Keep-alive mirror: identical data, identical revision.
                vec![
                    Message::builder("9999")
                        .data(msg.data.clone())
                        .revision_field(&msg.header.revision)
                        .build(),
                ]
            },
            "0008" => {
                let target = extract_digits(&msg.data_ascii(), 4);
                match target {
                    Some(target) if self.state.catalog().contains(&target) => {
                        session.subscribe(&target);
                        vec![ack_reply(&mid)]
                    },
                    _ => vec![error_reply(&mid, ErrorCode::SubscriptionTargetUnknown)],
                }
            },
            "0009" => {
                if let Some(target) = extract_digits(&msg.data_ascii(), 4) {
                    session.unsubscribe(&target);
                }
                vec![ack_reply(&mid)]
            },
            "0006" => self.handle_parameter_upload(&mid, msg),
            _ => match category {
                MidCategory::SubscriptionStart => {
                    session.subscribe(&mid);
                    vec![ack_reply(&mid)]
                },
                MidCategory::SubscriptionStop => {
                    session.unsubscribe(&mid);
                    vec![ack_reply(&mid)]
                },
                MidCategory::Request => self.handle_request(&mid),
                MidCategory::Command => self.handle_command(session, &mid, msg),
                MidCategory::Ack => Vec::new(),
                // Event/data frames from the integrator side are accepted
                // command-style for compatibility.
                _ => vec![ack_reply(&mid)],
            },
        }
    }

    fn handle_communication_start(&self, session: &SessionContext) -> Vec<Message> {
        if session.communication_started() {
            return vec![error_reply("0001", ErrorCode::CommunicationNotStarted)];
        }
        if session.role() == SessionRole::Actor
            && self.state.actor_active(Some(session.session_id()))
        {
            return vec![error_reply("0001", ErrorCode::ActorAlreadyConnected)];
        }
        session.set_communication_started(true);
        vec![build_communication_start_reply()]
    }

    fn handle_parameter_upload(&self, mid: &str, msg: &Message) -> Vec<Message> {
        let target = extract_digits(&msg.data_ascii(), 4);
        let Some(target) = target else {
            return vec![error_reply(mid, ErrorCode::RequestTargetUnknown)];
        };
        if !self.state.catalog().contains(&target) || !self.state.is_mid_supported(&target) {
            return vec![error_reply(mid, ErrorCode::RequestTargetUnknown)];
        }
        let data = self.state.build_data_for_mid(&target);
        vec![Message::builder(&target).data(data).revision(1).build()]
    }

    fn handle_request(&self, mid: &str) -> Vec<Message> {
        let reply_mid = request_reply(mid).map(str::to_string).or_else(|| {
            // Fall back to the mid+1 convention when the catalog flags the
            // successor as a reply-carrying MID.
            let successor = format!("{:04}", mid.parse::<u32>().ok()? + 1);
            let candidate = self.state.catalog().get(&successor)?;
            matches!(candidate.category, MidCategory::Reply | MidCategory::EventOrData)
                .then_some(successor)
        });
        let Some(reply_mid) = reply_mid else {
            return vec![error_reply(mid, ErrorCode::RequestTargetUnknown)];
        };
        let data = self.state.build_data_for_mid(&reply_mid);
        vec![Message::builder(&reply_mid).data(data).revision(1).build()]
    }

    fn handle_command(&self, session: &SessionContext, mid: &str, msg: &Message) -> Vec<Message> {
        if let Err(code) = self.state.ensure_command_allowed(session) {
            return vec![error_reply(mid, code)];
        }
        self.apply_command_side_effects(mid, msg);
        vec![ack_reply(mid)]
    }

    /// Command side effects on state. Numeric operands are the first run of
    /// enough digits in the payload; parse failures keep the previous value.
    fn apply_command_side_effects(&self, mid: &str, msg: &Message) {
        let data = msg.data_ascii();
        match mid {
            "0018" => self.update_domain_field("pset", "selected", |previous| {
                Value::String(extract_digits(&data, 3).unwrap_or(previous))
            }),
            "0038" => self.update_domain_field("job", "selected", |previous| {
                Value::String(extract_digits(&data, 4).unwrap_or(previous))
            }),
            "0019" => self.update_domain_field("pset", "batch_size", |_| {
                let batch = extract_digits(&data, 4)
                    .and_then(|d| d.parse::<u64>().ok())
                    .unwrap_or(1);
                Value::Number(batch.into())
            }),
            "0020" => {
                self.update_domain_field("pset", "batch_counter", |_| Value::Number(0.into()));
            },
            "0042" => self.update_domain_field("tool", "enabled", |_| Value::Bool(false)),
            "0043" => self.update_domain_field("tool", "enabled", |_| Value::Bool(true)),
            "0046" => self.update_domain_field("tool", "primary_tool", |_| {
                Value::String(extract_digits(&data, 2).unwrap_or_else(|| "01".to_string()))
            }),
            "0156" => self.update_domain_field("identifiers", "latest", |_| Value::Null),
            "0157" => {
                self.update_domain_field("identifiers", "latest", |_| Value::Null);
                self.update_domain_field("identifiers", "all", |_| Value::Array(Vec::new()));
            },
            "0240" => self.update_domain("user_data", |domain| {
                if let Some(Value::Object(records)) = domain.get_mut("records") {
                    records.insert("last_download".to_string(), Value::String(data.clone()));
                }
            }),
            "0270" => self.state.reset(),
            "2606" => self.update_domain_field("mode", "selected", |previous| {
                Value::String(extract_digits(&data, 4).unwrap_or(previous))
            }),
            _ => {},
        }
    }

    /// Replace one scalar field of a domain; `update` receives the previous
    /// value rendered as a string.
    fn update_domain_field(
        &self,
        domain_name: &str,
        field: &str,
        update: impl FnOnce(String) -> Value,
    ) {
        self.update_domain(domain_name, |domain| {
            let previous = match domain.get(field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            if let Value::Object(map) = domain {
                map.insert(field.to_string(), update(previous));
            }
        });
    }

    fn update_domain(&self, domain_name: &str, mutate: impl FnOnce(&mut Value)) {
        if let Ok(mut domain) = self.state.domain(domain_name) {
            mutate(&mut domain);
            if let Err(err) = self.state.replace_domain(domain_name, domain) {
                tracing::warn!("command side effect on {domain_name} failed: {err}");
            }
        }
    }
}

/// Build an 0004 error reply: `<mid><code>`.
#[must_use]
pub fn error_reply(mid: &str, code: ErrorCode) -> Message {
    Message::builder(ERROR_MID)
        .data(format_mid_error_payload(mid, code.code()))
        .revision(1)
        .build()
}

/// Build an 0005 acknowledge reply: the acked MID.
#[must_use]
pub fn ack_reply(mid: &str) -> Message {
    Message::builder(ACK_MID).data(format_mid_ack_payload(mid)).revision(1).build()
}

/// Build the 0002 communication-start reply (revision 7): the fixed-width
/// controller identity record, ending with a 19-character
/// `YYYY-MM-DD:HH:MM:SS` timestamp.
#[must_use]
pub fn build_communication_start_reply() -> Message {
    let now = Utc::now().format("%Y-%m-%d:%H:%M:%S").to_string();
    let data = ascii_payload(&[
        "01",
        "0001",
        "02",
        "01",
        "03",
        &fit_left("OpenProtocolSim", 25),
        "04",
        "ACT",
        "05",
        &fit_left("2.16.0", 19),
        "06",
        &fit_left("opsim-0.1.0", 19),
        "07",
        &fit_left("opsim-tool-0.1", 19),
        "08",
        &fit_left("SIM-RBU", 24),
        "09",
        &fit_left("SIM0000001", 10),
        "10",
        "003",
        "11",
        "001",
        "12",
        "1",
        "13",
        "1",
        "14",
        "0000000001",
        "15",
        &fit_left("Simulator Station", 25),
        "16",
        "1",
        "17",
        "0",
        "18",
        &fit_left(&now, 19),
    ]);
    Message::builder("0002").data(data).revision(7).build()
}

/// First run of at least `width` consecutive ASCII digits, truncated to
/// `width`.
fn extract_digits(data: &str, width: usize) -> Option<String> {
    let bytes = data.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            let run_start = *start.get_or_insert(i);
            if i + 1 - run_start == width {
                return String::from_utf8(bytes[run_start..=i].to_vec()).ok();
            }
        } else {
            start = None;
        }
    }
    None
}
