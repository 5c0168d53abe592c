//! Controller profiles: which MIDs (and revisions) the simulator advertises.
//!
//! A profile is a named view over the catalog. Switching the active profile
//! swaps a single name; the catalog itself is never rebuilt.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use opsim_proto::normalize_mid;

/// One profile definition, as stored in `data/profiles/<name>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Stable profile key, e.g. `atlas_pf`.
    pub name: String,
    /// Display name for UIs; defaults to `name`.
    #[serde(default)]
    pub display_name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// MIDs this profile supports.
    #[serde(default)]
    pub supported_mids: BTreeSet<String>,
    /// Per-MID revision overrides replacing the catalog's list.
    #[serde(default)]
    pub revision_overrides: HashMap<String, Vec<u32>>,
    /// Free-form vendor notes.
    #[serde(default)]
    pub notes: serde_json::Value,
}

impl Profile {
    /// Whether this profile supports a MID (normalized first).
    #[must_use]
    pub fn supports(&self, mid: &str) -> bool {
        self.supported_mids.contains(&normalize_mid(mid))
    }

    /// Revision override for a MID, if any.
    #[must_use]
    pub fn revision_override(&self, mid: &str) -> Option<&Vec<u32>> {
        self.revision_overrides.get(&normalize_mid(mid))
    }
}

/// All known profiles plus the active one.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    profiles: BTreeMap<String, Profile>,
    active: String,
}

impl ProfileStore {
    /// Build a store from profiles; `active` falls back to the first profile
    /// (by name) when unknown.
    pub fn new(profiles: Vec<Profile>, active: &str) -> Result<Self, CoreError> {
        let profiles: BTreeMap<String, Profile> = profiles
            .into_iter()
            .map(|mut p| {
                if p.display_name.is_empty() {
                    p.display_name.clone_from(&p.name);
                }
                (p.name.clone(), p)
            })
            .collect();
        let Some(first) = profiles.keys().next().cloned() else {
            return Err(CoreError::NoProfiles("<empty>".to_string()));
        };
        let active =
            if profiles.contains_key(active) { active.to_string() } else { first };
        Ok(Self { profiles, active })
    }

    /// Load every `*.json` profile from a directory.
    pub fn from_directory(path: &Path, active: &str) -> Result<Self, CoreError> {
        let mut profiles = Vec::new();
        let mut entries: Vec<_> =
            std::fs::read_dir(path)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(std::fs::DirEntry::path);
        for entry in entries {
            let file = entry.path();
            if file.extension().is_some_and(|ext| ext == "json") {
                let raw = std::fs::read_to_string(&file)?;
                profiles.push(serde_json::from_str::<Profile>(&raw)?);
            }
        }
        if profiles.is_empty() {
            return Err(CoreError::NoProfiles(path.display().to_string()));
        }
        Self::new(profiles, active)
    }

    /// The active profile.
    #[must_use]
    pub fn active(&self) -> &Profile {
        // The constructor guarantees `active` is a valid key.
        self.profiles.get(&self.active).unwrap_or_else(|| unreachable!("active profile exists"))
    }

    /// Name of the active profile.
    #[must_use]
    pub fn active_name(&self) -> &str {
        &self.active
    }

    /// Switch the active profile.
    pub fn set_active(&mut self, name: &str) -> Result<(), CoreError> {
        if !self.profiles.contains_key(name) {
            return Err(CoreError::UnknownProfile(name.to_string()));
        }
        self.active = name.to_string();
        Ok(())
    }

    /// All profiles in name order.
    pub fn all(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    /// Look up a profile by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }
}
