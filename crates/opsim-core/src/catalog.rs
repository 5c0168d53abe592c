//! MID catalog: the static definition of every message the controller knows.
//!
//! Loaded once from JSON at startup and read-only afterwards. Lookups
//! normalize the MID first, so `get("61")` and `get("0061")` resolve the same
//! entry. The schema / ack-strategy / error-rule fields ride along as opaque
//! JSON; the dispatcher keys off `category` and `supported_revisions` only.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use opsim_proto::normalize_mid;

/// Protocol-level category of a MID, driving dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidCategory {
    /// Link/session management (0001, 0003, 9999, ...).
    Session,
    /// A request expecting a data reply.
    Request,
    /// A reply carrying requested data.
    Reply,
    /// A command mutating controller state, acknowledged with 0005.
    Command,
    /// Starts a subscription; the MID itself names the feed.
    SubscriptionStart,
    /// Stops a subscription.
    SubscriptionStop,
    /// An acknowledge; never answered.
    Ack,
    /// Pushed event or data message.
    EventOrData,
}

/// One catalog entry, as stored in `mid_catalog.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidDefinition {
    /// 4-digit MID.
    pub mid: String,
    /// Human-readable name from the protocol specification.
    pub name: String,
    /// Dispatch category.
    pub category: MidCategory,
    /// `integrator_to_controller`, `controller_to_integrator`, or `both`.
    pub direction: String,
    /// Revisions this simulator can answer, lowest first.
    #[serde(default = "default_revisions")]
    pub supported_revisions: Vec<u32>,
    /// Opaque payload schema description.
    #[serde(default)]
    pub payload_schema: serde_json::Value,
    /// Opaque acknowledge strategy tag.
    #[serde(default = "default_ack_strategy")]
    pub ack_strategy: String,
    /// Opaque error-rule tags.
    #[serde(default)]
    pub error_rules: Vec<String>,
    /// Opaque per-profile notes.
    #[serde(default)]
    pub profile_overrides: serde_json::Value,
}

fn default_revisions() -> Vec<u32> {
    vec![1]
}

fn default_ack_strategy() -> String {
    "none".to_string()
}

/// The full MID catalog, keyed by normalized MID.
#[derive(Debug, Clone)]
pub struct MidCatalog {
    entries: BTreeMap<String, MidDefinition>,
}

impl MidCatalog {
    /// Build a catalog from definitions, normalizing every MID.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = MidDefinition>) -> Self {
        let entries = entries
            .into_iter()
            .map(|mut def| {
                def.mid = normalize_mid(&def.mid);
                (def.mid.clone(), def)
            })
            .collect();
        Self { entries }
    }

    /// Load the catalog from a JSON array file.
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<MidDefinition> = serde_json::from_str(&raw)?;
        Ok(Self::from_entries(entries))
    }

    /// Look up a definition by MID (normalized first).
    #[must_use]
    pub fn get(&self, mid: &str) -> Option<&MidDefinition> {
        self.entries.get(&normalize_mid(mid))
    }

    /// Whether the catalog knows this MID.
    #[must_use]
    pub fn contains(&self, mid: &str) -> bool {
        self.entries.contains_key(&normalize_mid(mid))
    }

    /// All definitions in ascending MID order.
    pub fn entries(&self) -> impl Iterator<Item = &MidDefinition> {
        self.entries.values()
    }

    /// Number of catalog entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
