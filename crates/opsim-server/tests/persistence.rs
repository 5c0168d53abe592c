//! Write-through persistence behavior of the state store.
//!
//! Every mutator writes the full domain tree through to the configured
//! backend, and a saved snapshot replaces the initial domains on startup.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Value, json};

use opsim_core::{
    Direction, MidCatalog, Persistence, Profile, ProfileStore, SessionContext, SessionRole,
    SimLimits, SimulatorState,
};
use opsim_server::MemoryStorage;

fn profiles() -> ProfileStore {
    let profile = Profile {
        name: "atlas_pf".to_string(),
        display_name: String::new(),
        description: String::new(),
        supported_mids: BTreeSet::new(),
        revision_overrides: HashMap::new(),
        notes: Value::Null,
    };
    ProfileStore::new(vec![profile], "atlas_pf").expect("profile store")
}

fn state_with(storage: &MemoryStorage) -> SimulatorState {
    let persistence: Option<Arc<dyn Persistence>> = Some(Arc::new(storage.clone()));
    SimulatorState::new(MidCatalog::from_entries([]), profiles(), persistence, SimLimits::default())
}

#[test]
fn event_mutations_write_through() {
    let storage = MemoryStorage::new();
    let state = state_with(&storage);

    state.inject_event("tightening", json!({"torque_nm": 11.0}));

    let snapshot = storage.snapshot().expect("snapshot written");
    assert_eq!(
        snapshot.get("results").and_then(|r| r.get("last_tightening_id")),
        Some(&json!(2))
    );
}

#[test]
fn snapshot_replaces_initial_domains_on_startup() {
    let storage = MemoryStorage::new();
    {
        let state = state_with(&storage);
        state.inject_event("tightening", json!({}));
        state.inject_event("tightening", json!({}));
    }

    let restarted = state_with(&storage);
    let results = restarted.domain("results").expect("results domain");
    assert_eq!(results.get("last_tightening_id"), Some(&json!(3)));
}

#[test]
fn traffic_appends_to_the_log() {
    let storage = MemoryStorage::new();
    let state = state_with(&storage);
    let session = SessionContext::new(
        "feedfacecafe".to_string(),
        SessionRole::Classic,
        "test".to_string(),
    );

    let msg = opsim_proto::Message::builder("9999").build();
    state.record_traffic(&session, Direction::Rx, &msg);
    state.record_traffic(&session, Direction::Tx, &msg);

    assert_eq!(storage.traffic_len(), 2);
}

#[test]
fn reset_persists_the_fresh_tree() {
    let storage = MemoryStorage::new();
    let state = state_with(&storage);
    state.inject_event("tightening", json!({}));

    state.reset();

    let snapshot = storage.snapshot().expect("snapshot written");
    assert_eq!(
        snapshot.get("results").and_then(|r| r.get("last_tightening_id")),
        Some(&json!(1))
    );
}
