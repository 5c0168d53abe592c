//! The simulator state store.
//!
//! One process-wide store owns everything mutable: the JSON domain tree, the
//! traffic ring, the event ring, the session registry, and the profile
//! store. A single mutex serializes access and every read hands out deep
//! copies, so no caller can alias internal state. Critical sections never
//! await; the store is safe to call from async tasks.
//!
//! When persistence is configured every mutator writes through after
//! releasing the lock; a failed write logs a warning and the mutation
//! stands.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use crate::catalog::{MidCatalog, MidCategory};
use crate::error::{CoreError, ErrorCode};
use crate::events::{EVENT_CAP, SimulationEvent, default_event_mids, subscription_targets};
use crate::ids::random_hex;
use crate::persist::{DomainMap, Persistence};
use crate::profiles::ProfileStore;
use crate::session::{SessionContext, SessionRole, SessionSnapshot};
use crate::traffic::{Direction, TRAFFIC_CAP, TrafficRecord};
use opsim_proto::{Message, ascii_payload, fit_left, fit_right_zero, normalize_mid};

/// Operational limits, from configuration.
#[derive(Debug, Clone)]
pub struct SimLimits {
    /// Maximum concurrent sessions across all listeners.
    pub max_sessions: usize,
    /// Close sessions idle longer than this.
    pub keepalive_timeout: Duration,
    /// Advisory keep-alive interval hint; not enforced by the watchdog.
    pub inactivity_hint: Duration,
}

impl Default for SimLimits {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            keepalive_timeout: Duration::from_secs(15),
            inactivity_hint: Duration::from_secs(10),
        }
    }
}

/// Everything guarded by the store mutex.
struct Inner {
    domains: DomainMap,
    traffic: VecDeque<TrafficRecord>,
    events: VecDeque<SimulationEvent>,
    sessions: HashMap<String, Arc<SessionContext>>,
    profiles: ProfileStore,
}

/// The process-wide simulator state.
pub struct SimulatorState {
    catalog: MidCatalog,
    persistence: Option<Arc<dyn Persistence>>,
    limits: SimLimits,
    inner: Mutex<Inner>,
}

impl SimulatorState {
    /// Build the store. A persisted snapshot, when present, replaces the
    /// initial domain tree.
    #[must_use]
    pub fn new(
        catalog: MidCatalog,
        profiles: ProfileStore,
        persistence: Option<Arc<dyn Persistence>>,
        limits: SimLimits,
    ) -> Self {
        let mut domains = initial_domains(profiles.active_name());
        if let Some(store) = persistence.as_deref() {
            match store.load_state() {
                Ok(Some(saved)) => domains = saved,
                Ok(None) => {},
                Err(err) => tracing::warn!("ignoring persisted state: {err}"),
            }
        }
        Self {
            catalog,
            persistence,
            limits,
            inner: Mutex::new(Inner {
                domains,
                traffic: VecDeque::new(),
                events: VecDeque::new(),
                sessions: HashMap::new(),
                profiles,
            }),
        }
    }

    /// The MID catalog (read-only).
    #[must_use]
    pub fn catalog(&self) -> &MidCatalog {
        &self.catalog
    }

    /// Operational limits.
    #[must_use]
    pub fn limits(&self) -> &SimLimits {
        &self.limits
    }

    // Sessions

    /// Register a session; fails when the registry is full.
    pub fn register_session(&self, session: Arc<SessionContext>) -> Result<(), CoreError> {
        let mut inner = self.lock();
        if inner.sessions.len() >= self.limits.max_sessions {
            return Err(CoreError::SessionLimit(inner.sessions.len()));
        }
        inner.sessions.insert(session.session_id().to_string(), session);
        Ok(())
    }

    /// Remove a session; unknown ids are ignored.
    pub fn unregister_session(&self, session_id: &str) {
        self.lock().sessions.remove(session_id);
    }

    /// Handles to every registered session.
    #[must_use]
    pub fn session_handles(&self) -> Vec<Arc<SessionContext>> {
        self.lock().sessions.values().cloned().collect()
    }

    /// Handle to one session.
    #[must_use]
    pub fn get_session(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.lock().sessions.get(session_id).cloned()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Snapshots of every session, sorted by creation time.
    #[must_use]
    pub fn session_snapshots(&self) -> Vec<SessionSnapshot> {
        let handles = self.session_handles();
        let mut snapshots: Vec<SessionSnapshot> = handles.iter().map(|s| s.snapshot()).collect();
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    /// Whether any other session is an actor with communication started.
    #[must_use]
    pub fn actor_active(&self, exclude_session: Option<&str>) -> bool {
        let handles = self.session_handles();
        handles.iter().any(|s| {
            exclude_session != Some(s.session_id())
                && s.role() == SessionRole::Actor
                && s.communication_started()
        })
    }

    /// Commands are refused with error 92 for non-actor sessions while an
    /// actor holds a started session.
    pub fn ensure_command_allowed(&self, session: &SessionContext) -> Result<(), ErrorCode> {
        if session.role() == SessionRole::Actor {
            return Ok(());
        }
        if self.actor_active(Some(session.session_id())) {
            return Err(ErrorCode::CommandDisabledByActor);
        }
        Ok(())
    }

    // Traffic

    /// Append a traffic record (ring capped at [`TRAFFIC_CAP`]).
    pub fn record_traffic(&self, session: &SessionContext, direction: Direction, msg: &Message) {
        let record = TrafficRecord::capture(session, direction, msg);
        {
            let mut inner = self.lock();
            inner.traffic.push_back(record.clone());
            while inner.traffic.len() > TRAFFIC_CAP {
                inner.traffic.pop_front();
            }
        }
        if let Some(store) = self.persistence.as_deref() {
            if let Err(err) = store.append_traffic(&record) {
                tracing::warn!("traffic persistence failed: {err}");
            }
        }
    }

    /// The most recent traffic, optionally filtered by MID and/or session.
    /// `limit` is clamped to `[1, 500]`.
    #[must_use]
    pub fn list_traffic(
        &self,
        limit: usize,
        mid: Option<&str>,
        session_id: Option<&str>,
    ) -> Vec<TrafficRecord> {
        let limit = limit.clamp(1, 500);
        let mid = mid.map(normalize_mid);
        let inner = self.lock();
        let filtered: Vec<&TrafficRecord> = inner
            .traffic
            .iter()
            .filter(|t| mid.as_deref().is_none_or(|m| t.mid == m))
            .filter(|t| session_id.is_none_or(|s| t.session_id == s))
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).cloned().collect()
    }

    // Domains

    /// Deep copy of the whole domain tree.
    #[must_use]
    pub fn domains(&self) -> DomainMap {
        self.lock().domains.clone()
    }

    /// Deep copy of one domain.
    pub fn domain(&self, name: &str) -> Result<Value, CoreError> {
        self.lock()
            .domains
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownDomain(name.to_string()))
    }

    /// Replace one domain wholesale; stamps `metadata.updated_at`.
    pub fn replace_domain(&self, name: &str, payload: Value) -> Result<Value, CoreError> {
        let domains = {
            let mut inner = self.lock();
            if !inner.domains.contains_key(name) {
                return Err(CoreError::UnknownDomain(name.to_string()));
            }
            inner.domains.insert(name.to_string(), payload);
            stamp_updated(&mut inner.domains);
            inner.domains.clone()
        };
        self.persist_state(&domains);
        Ok(domains.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Reinstall initial state: fresh domains, every session's protocol
    /// state reset, event log cleared. Traffic is retained.
    pub fn reset(&self) {
        let domains = {
            let mut inner = self.lock();
            let fresh = initial_domains(inner.profiles.active_name());
            inner.domains = fresh;
            for session in inner.sessions.values() {
                session.reset_protocol();
            }
            inner.events.clear();
            inner.domains.clone()
        };
        self.persist_state(&domains);
    }

    // Profiles

    /// Switch the active profile and update `metadata.profile`.
    pub fn set_profile(&self, name: &str) -> Result<(), CoreError> {
        let domains = {
            let mut inner = self.lock();
            inner.profiles.set_active(name)?;
            if let Some(Value::Object(metadata)) = inner.domains.get_mut("metadata") {
                metadata.insert("profile".to_string(), Value::String(name.to_string()));
            }
            stamp_updated(&mut inner.domains);
            inner.domains.clone()
        };
        self.persist_state(&domains);
        Ok(())
    }

    /// Name of the active profile.
    #[must_use]
    pub fn active_profile_name(&self) -> String {
        self.lock().profiles.active_name().to_string()
    }

    /// Profile enumeration payload for the control plane.
    #[must_use]
    pub fn profile_overview(&self) -> Value {
        let inner = self.lock();
        let active = inner.profiles.active();
        json!({
            "active": inner.profiles.active_name(),
            "profiles": inner.profiles.all().map(|p| json!({
                "name": p.name,
                "display_name": p.display_name,
                "description": p.description,
                "supported_mid_count": p.supported_mids.len(),
            })).collect::<Vec<_>>(),
            "active_details": {
                "name": active.name,
                "description": active.description,
                "supported_mids": active.supported_mids,
                "revision_overrides": active.revision_overrides,
                "notes": active.notes,
            },
        })
    }

    /// Whether the active profile supports a MID.
    #[must_use]
    pub fn is_mid_supported(&self, mid: &str) -> bool {
        self.lock().profiles.active().supports(mid)
    }

    /// Revisions the simulator answers for a MID under the active profile:
    /// the profile override, else the catalog list, else `[1]`.
    #[must_use]
    pub fn effective_revisions(&self, mid: &str) -> Vec<u32> {
        let inner = self.lock();
        if let Some(revs) = inner.profiles.active().revision_override(mid) {
            if !revs.is_empty() {
                return revs.clone();
            }
        }
        self.catalog.get(mid).map_or_else(|| vec![1], |def| def.supported_revisions.clone())
    }

    /// Full capability matrix (mid × supported × revisions) under the
    /// active profile.
    #[must_use]
    pub fn capability_matrix(&self) -> Vec<CapabilityEntry> {
        let inner = self.lock();
        let active = inner.profiles.active();
        self.catalog
            .entries()
            .map(|def| CapabilityEntry {
                mid: def.mid.clone(),
                name: def.name.clone(),
                category: def.category,
                supported: active.supports(&def.mid),
                revisions: active
                    .revision_override(&def.mid)
                    .cloned()
                    .unwrap_or_else(|| def.supported_revisions.clone()),
            })
            .collect()
    }

    // Events

    /// Inject a logical event: resolve affected MIDs, record it, apply the
    /// type-specific state mutation.
    pub fn inject_event(&self, event_type: &str, payload: Value) -> SimulationEvent {
        let affected = payload
            .get("mids")
            .and_then(Value::as_array)
            .map(|mids| {
                mids.iter()
                    .filter_map(Value::as_str)
                    .map(normalize_mid)
                    .collect::<Vec<String>>()
            })
            .unwrap_or_else(|| default_event_mids(event_type));

        let event = SimulationEvent {
            event_id: random_hex(32),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
            affected_mids: affected,
        };

        let mutated = {
            let mut inner = self.lock();
            inner.events.push_back(event.clone());
            while inner.events.len() > EVENT_CAP {
                inner.events.pop_front();
            }
            let mutated = match event_type {
                "tightening" => {
                    apply_tightening(&mut inner.domains, &payload);
                    true
                },
                "alarm" => {
                    apply_alarm(&mut inner.domains, &payload);
                    true
                },
                "io_change" => {
                    apply_io_change(&mut inner.domains, &payload);
                    true
                },
                _ => false,
            };
            mutated.then(|| inner.domains.clone())
        };
        if let Some(domains) = mutated {
            self.persist_state(&domains);
        }

        event
    }

    /// Recent simulation events, newest last.
    #[must_use]
    pub fn recent_events(&self, limit: usize) -> Vec<SimulationEvent> {
        let inner = self.lock();
        let skip = inner.events.len().saturating_sub(limit.max(1));
        inner.events.iter().skip(skip).cloned().collect()
    }

    /// Build the push messages an event produces for one session.
    ///
    /// The session's subscription targets are the union over each subscribed
    /// MID of its mapped notification MIDs plus the subscribed MID itself.
    /// Affected MIDs are emitted in ascending order; messages are not
    /// sequence-stamped (that happens at send time).
    #[must_use]
    pub fn generate_push_messages(
        &self,
        session: &SessionContext,
        event: &SimulationEvent,
    ) -> Vec<Message> {
        let mut targets: BTreeSet<String> = BTreeSet::new();
        for sub in session.subscriptions() {
            for target in subscription_targets(&sub) {
                targets.insert((*target).to_string());
            }
            targets.insert(sub);
        }

        let affected: BTreeSet<String> =
            event.affected_mids.iter().map(|m| normalize_mid(m)).collect();

        let inner = self.lock();
        affected
            .iter()
            .filter(|mid| targets.contains(*mid))
            .map(|mid| {
                let data = build_data_locked(&inner.domains, mid);
                Message::builder(mid).data(data).revision(1).build()
            })
            .collect()
    }

    /// Materialize the reply payload for a MID from current state.
    #[must_use]
    pub fn build_data_for_mid(&self, mid: &str) -> Bytes {
        let inner = self.lock();
        build_data_locked(&inner.domains, &normalize_mid(mid))
    }

    fn persist_state(&self, domains: &DomainMap) {
        if let Some(store) = self.persistence.as_deref() {
            if let Err(err) = store.save_state(domains) {
                tracing::warn!("state persistence failed: {err}");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One row of the capability matrix.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityEntry {
    /// 4-digit MID.
    pub mid: String,
    /// Catalog name.
    pub name: String,
    /// Dispatch category.
    pub category: MidCategory,
    /// Supported under the active profile.
    pub supported: bool,
    /// Effective revisions under the active profile.
    pub revisions: Vec<u32>,
}

/// The initial domain tree of a factory-fresh simulator.
#[must_use]
pub fn initial_domains(profile: &str) -> DomainMap {
    let now = Utc::now().to_rfc3339();
    let Value::Object(map) = json!({
        "metadata": {"created_at": now, "profile": profile},
        "tool": {
            "enabled": true,
            "primary_tool": "01",
            "calibration_value": "0.00",
            "paired": false,
        },
        "job": {"selected": "0001", "running": false, "batch_counter": 0, "batch_size": 1},
        "pset": {"selected": "001", "running": false, "batch_counter": 0, "batch_size": 1},
        "vin": {"current": "SIMVIN00000000001", "history": []},
        "results": {"last_tightening_id": 1, "history": []},
        "alarms": {"active": [], "history": []},
        "io": {"relays": {}, "inputs": {}, "relay_functions": {}, "digin_functions": {}},
        "selector": {"socket": "1", "green": [], "red": []},
        "traces": {"latest": null},
        "programs": {"last_download": null, "catalog": {}},
        "mode": {"selected": "0001", "list": [{"id": "0001", "name": "Default"}]},
        "user_data": {"records": {}},
        "identifiers": {"latest": null, "all": []},
    }) else {
        unreachable!("initial domain literal is an object")
    };
    map
}

fn stamp_updated(domains: &mut DomainMap) {
    if let Some(Value::Object(metadata)) = domains.get_mut("metadata") {
        metadata.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
    }
}

// Event mutations

fn apply_tightening(domains: &mut DomainMap, payload: &Value) {
    let tightening_id = domains
        .get("results")
        .and_then(|r| r.get("last_tightening_id"))
        .and_then(Value::as_u64)
        .unwrap_or(1)
        + 1;
    let torque = payload.get("torque_nm").and_then(Value::as_f64).unwrap_or(12.34);
    let angle = payload.get("angle_deg").and_then(Value::as_f64).unwrap_or(123.0);
    let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(true);
    let result = json!({
        "tightening_id": tightening_id,
        "timestamp": Utc::now().to_rfc3339(),
        "torque_nm": torque,
        "angle_deg": angle,
        "status": if ok { "OK" } else { "NOK" },
    });

    if let Some(Value::Object(results)) = domains.get_mut("results") {
        results.insert("last_tightening_id".to_string(), json!(tightening_id));
        let history = results.entry("history".to_string()).or_insert_with(|| json!([]));
        if let Value::Array(items) = history {
            items.push(result);
            let excess = items.len().saturating_sub(1000);
            items.drain(..excess);
        }
    }

    let points = payload.get("trace_points").cloned().unwrap_or_else(|| json!([10, 12, 14, 15, 14, 12]));
    if let Some(Value::Object(traces)) = domains.get_mut("traces") {
        traces.insert(
            "latest".to_string(),
            json!({"tightening_id": tightening_id, "points": points}),
        );
    }
}

fn apply_alarm(domains: &mut DomainMap, payload: &Value) {
    let alarm = json!({
        "code": payload.get("code").and_then(Value::as_str).unwrap_or("0001"),
        "text": payload.get("text").and_then(Value::as_str).unwrap_or("Simulated alarm"),
        "timestamp": Utc::now().to_rfc3339(),
    });
    if let Some(Value::Object(alarms)) = domains.get_mut("alarms") {
        alarms.insert("active".to_string(), json!([alarm.clone()]));
        let history = alarms.entry("history".to_string()).or_insert_with(|| json!([]));
        if let Value::Array(items) = history {
            items.push(alarm);
            let excess = items.len().saturating_sub(1000);
            items.drain(..excess);
        }
    }
}

fn apply_io_change(domains: &mut DomainMap, payload: &Value) {
    let key = payload.get("key").and_then(Value::as_str).unwrap_or("input_01").to_string();
    let value = payload.get("value").cloned().unwrap_or(Value::Bool(true));
    if let Some(Value::Object(io)) = domains.get_mut("io") {
        if let Some(Value::Object(inputs)) = io.get_mut("inputs") {
            inputs.insert(key, value);
        }
    }
}

// Payload materialization

/// Convert a JSON scalar to its payload string form.
fn text(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => default.to_string(),
    }
}

fn domain_field<'a>(domains: &'a DomainMap, domain: &str, key: &str) -> Option<&'a Value> {
    domains.get(domain).and_then(|d| d.get(key))
}

fn latest_result(domains: &DomainMap) -> Option<&Value> {
    domain_field(domains, "results", "history").and_then(Value::as_array).and_then(|h| h.last())
}

fn active_alarm(domains: &DomainMap) -> (String, String) {
    let alarm = domain_field(domains, "alarms", "active")
        .and_then(Value::as_array)
        .and_then(|a| a.last());
    match alarm {
        Some(alarm) => (
            text(alarm.get("code"), "0000"),
            text(alarm.get("text"), "No alarm"),
        ),
        None => ("0000".to_string(), "No alarm".to_string()),
    }
}

fn build_data_locked(domains: &DomainMap, mid: &str) -> Bytes {
    match mid {
        "0015" => {
            let pset = text(domain_field(domains, "pset", "selected"), "001");
            ascii_payload(&["01", &fit_right_zero(&pset, 3)])
        },
        "0022" => ascii_payload(&["01", "1"]),
        "0035" => {
            let job = text(domain_field(domains, "job", "selected"), "0001");
            ascii_payload(&["01", &fit_right_zero(&job, 4)])
        },
        "0052" => {
            let vin = text(domain_field(domains, "vin", "current"), "");
            ascii_payload(&["01", &fit_left(&vin, 25)])
        },
        "0061" => {
            let last_id = domain_field(domains, "results", "last_tightening_id")
                .and_then(Value::as_u64)
                .unwrap_or(1);
            let (tid, status) = match latest_result(domains) {
                Some(latest) => (
                    text(latest.get("tightening_id"), &last_id.to_string()),
                    text(latest.get("status"), "OK"),
                ),
                None => (last_id.to_string(), "OK".to_string()),
            };
            ascii_payload(&["01", &fit_right_zero(&tid, 10), "02", &fit_left(&status, 3)])
        },
        "0071" | "1000" => {
            let (code, alarm_text) = active_alarm(domains);
            ascii_payload(&["01", &fit_right_zero(&code, 4), "02", &fit_left(&alarm_text, 25)])
        },
        "0211" | "0217" | "0221" => ascii_payload(&["01", "1"]),
        "0101" => ascii_payload(&["01", "MS_RESULT"]),
        "0106" => ascii_payload(&["01", "STATION_RESULT"]),
        "0107" => ascii_payload(&["01", "BOLT_RESULT"]),
        "0242" => ascii_payload(&["01", "USER_DATA"]),
        "0251" => {
            let socket = text(domain_field(domains, "selector", "socket"), "1");
            ascii_payload(&["01", &fit_right_zero(&socket, 2)])
        },
        "0262" => ascii_payload(&["01", "TAG1234567890"]),
        "0401" => ascii_payload(&["01", "AUTO"]),
        "0421" => ascii_payload(&["01", "0"]),
        "0501" => ascii_payload(&["01", "OK"]),
        "0900" => {
            let points: Vec<u8> = domain_field(domains, "traces", "latest")
                .filter(|latest| !latest.is_null())
                .and_then(|latest| latest.get("points"))
                .and_then(Value::as_array)
                .map_or_else(
                    || vec![10, 12, 14, 15],
                    |points| {
                        points.iter().filter_map(Value::as_u64).map(|p| (p & 0xFF) as u8).collect()
                    },
                );
            let mut data =
                ascii_payload(&["01", "TRACE", "02", &format!("{:04}", points.len())]).to_vec();
            data.push(0);
            data.extend_from_slice(&points);
            Bytes::from(data)
        },
        "1201" => {
            let (torque, angle) = match latest_result(domains) {
                Some(latest) => (
                    latest.get("torque_nm").and_then(Value::as_f64).unwrap_or(12.34),
                    latest.get("angle_deg").and_then(Value::as_f64).unwrap_or(123.0),
                ),
                None => (12.34, 123.0),
            };
            ascii_payload(&["01", &format!("{torque:07.2}"), "02", &format!("{angle:07.2}")])
        },
        "1202" => {
            let status = latest_result(domains)
                .map_or_else(|| "OK".to_string(), |latest| text(latest.get("status"), "OK"));
            ascii_payload(&["01", &fit_left(&status, 3)])
        },
        "2601" => ascii_payload(&["01", "0001"]),
        "2603" => ascii_payload(&["01", "MODE_DEFAULT"]),
        _ => ascii_payload(&["01", "SIM"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MidDefinition;
    use crate::profiles::Profile;

    fn entry(mid: &str, category: MidCategory) -> MidDefinition {
        MidDefinition {
            mid: mid.to_string(),
            name: format!("test {mid}"),
            category,
            direction: "both".to_string(),
            supported_revisions: vec![1],
            payload_schema: Value::Null,
            ack_strategy: "none".to_string(),
            error_rules: Vec::new(),
            profile_overrides: Value::Null,
        }
    }

    fn test_state() -> SimulatorState {
        let catalog = MidCatalog::from_entries([
            entry("0001", MidCategory::Session),
            entry("0060", MidCategory::SubscriptionStart),
            entry("0061", MidCategory::EventOrData),
        ]);
        let profile = Profile {
            name: "atlas_pf".to_string(),
            display_name: String::new(),
            description: String::new(),
            supported_mids: ["0001", "0060", "0061"].iter().map(|m| (*m).to_string()).collect(),
            revision_overrides: HashMap::new(),
            notes: Value::Null,
        };
        let profiles = ProfileStore::new(vec![profile], "atlas_pf").unwrap();
        SimulatorState::new(catalog, profiles, None, SimLimits::default())
    }

    fn test_session(id: &str, role: SessionRole) -> Arc<SessionContext> {
        Arc::new(SessionContext::new(id.to_string(), role, "test".to_string()))
    }

    #[test]
    fn session_limit_enforced() {
        let state = SimulatorState::new(
            MidCatalog::from_entries([]),
            ProfileStore::new(
                vec![Profile {
                    name: "p".to_string(),
                    display_name: String::new(),
                    description: String::new(),
                    supported_mids: BTreeSet::new(),
                    revision_overrides: HashMap::new(),
                    notes: Value::Null,
                }],
                "p",
            )
            .unwrap(),
            None,
            SimLimits { max_sessions: 1, ..SimLimits::default() },
        );
        state.register_session(test_session("a", SessionRole::Classic)).unwrap();
        assert!(matches!(
            state.register_session(test_session("b", SessionRole::Classic)),
            Err(CoreError::SessionLimit(1))
        ));
    }

    #[test]
    fn at_most_one_started_actor_is_visible() {
        let state = test_state();
        let actor = test_session("actor1", SessionRole::Actor);
        let classic = test_session("classic1", SessionRole::Classic);
        state.register_session(Arc::clone(&actor)).unwrap();
        state.register_session(Arc::clone(&classic)).unwrap();

        assert!(!state.actor_active(None));
        actor.set_communication_started(true);
        assert!(state.actor_active(None));
        assert!(!state.actor_active(Some("actor1")));

        // Commands from the classic session are now refused.
        assert_eq!(
            state.ensure_command_allowed(&classic),
            Err(ErrorCode::CommandDisabledByActor)
        );
        // The actor itself stays in control.
        assert_eq!(state.ensure_command_allowed(&actor), Ok(()));
    }

    #[test]
    fn tightening_bumps_monotonic_id() {
        let state = test_state();
        let event = state.inject_event("tightening", json!({"torque_nm": 9.5}));
        assert_eq!(event.affected_mids, vec!["0061", "1201", "1202"]);

        let results = state.domain("results").unwrap();
        assert_eq!(results.get("last_tightening_id").and_then(Value::as_u64), Some(2));

        state.inject_event("tightening", json!({}));
        let results = state.domain("results").unwrap();
        assert_eq!(results.get("last_tightening_id").and_then(Value::as_u64), Some(3));
    }

    #[test]
    fn event_mids_can_be_overridden_by_payload() {
        let state = test_state();
        let event = state.inject_event("alarm", json!({"mids": ["71", "1000"]}));
        assert_eq!(event.affected_mids, vec!["0071", "1000"]);
    }

    #[test]
    fn push_messages_follow_subscription_targets_in_order() {
        let state = test_state();
        let session = test_session("s1", SessionRole::Classic);
        session.subscribe("0060");

        let event = state.inject_event("tightening", json!({}));
        let pushes = state.generate_push_messages(&session, &event);
        // 0060 targets 0061 (and itself); 1201/1202 are not subscribed.
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].mid(), "0061");
        assert!(pushes[0].data.starts_with(b"010000000002"));
    }

    #[test]
    fn build_data_shapes() {
        let state = test_state();
        assert_eq!(state.build_data_for_mid("0015").as_ref(), b"01001");
        assert_eq!(state.build_data_for_mid("0035").as_ref(), b"010001");
        assert_eq!(
            state.build_data_for_mid("0052").as_ref(),
            b"01SIMVIN00000000001        "
        );
        assert_eq!(state.build_data_for_mid("1201").as_ref(), b"010012.34020123.00");
        assert_eq!(state.build_data_for_mid("4711").as_ref(), b"01SIM");
    }

    #[test]
    fn trace_payload_keeps_binary_layout() {
        let state = test_state();
        state.inject_event("tightening", json!({"trace_points": [1, 2, 3]}));
        let data = state.build_data_for_mid("0900");
        assert_eq!(&data[..13], b"01TRACE020003");
        assert_eq!(data[13], 0);
        assert_eq!(&data[14..], &[1, 2, 3]);
    }

    #[test]
    fn reset_restores_initial_state() {
        let state = test_state();
        let session = test_session("s1", SessionRole::Classic);
        state.register_session(Arc::clone(&session)).unwrap();
        session.set_communication_started(true);
        session.subscribe("0060");
        state.inject_event("tightening", json!({}));

        state.reset();

        let results = state.domain("results").unwrap();
        assert_eq!(results.get("last_tightening_id").and_then(Value::as_u64), Some(1));
        assert!(!session.communication_started());
        assert!(session.subscriptions().is_empty());
        assert!(state.recent_events(100).is_empty());
    }

    #[test]
    fn traffic_filters_and_clamps() {
        let state = test_state();
        let session = test_session("s1", SessionRole::Classic);
        for _ in 0..3 {
            let msg = Message::builder("9999").build();
            state.record_traffic(&session, Direction::Rx, &msg);
        }
        let msg = Message::builder("0001").data(&b"01"[..]).build();
        state.record_traffic(&session, Direction::Rx, &msg);

        assert_eq!(state.list_traffic(100, Some("9999"), None).len(), 3);
        assert_eq!(state.list_traffic(100, None, Some("other")).len(), 0);
        // limit clamps to at least one record
        assert_eq!(state.list_traffic(0, None, None).len(), 1);
    }

    #[test]
    fn unknown_domain_is_an_error() {
        let state = test_state();
        assert!(matches!(state.domain("bogus"), Err(CoreError::UnknownDomain(_))));
        assert!(matches!(
            state.replace_domain("bogus", json!({})),
            Err(CoreError::UnknownDomain(_))
        ));
    }
}
