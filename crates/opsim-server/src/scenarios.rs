//! Scenario definitions: named sequences of timed events.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ServerError;

/// One step of a scenario: wait, then inject an event.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    /// Seconds to sleep before this step's event.
    #[serde(default)]
    pub delay_sec: f64,
    /// Event type to inject.
    pub event: String,
    /// Base event payload; the run request's payload is merged on top.
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ScenarioDef {
    name: String,
    #[serde(default)]
    steps: Vec<ScenarioStep>,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    scenarios: Vec<ScenarioDef>,
}

/// All scenarios from `data/scenarios.json`, keyed by name.
#[derive(Debug, Default)]
pub struct ScenarioSet {
    scenarios: BTreeMap<String, Vec<ScenarioStep>>,
}

impl ScenarioSet {
    /// Load scenarios from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ScenarioFile = serde_json::from_str(&raw)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Ok(Self {
            scenarios: file.scenarios.into_iter().map(|s| (s.name, s.steps)).collect(),
        })
    }

    /// Sorted scenario names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    /// Steps of one scenario.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[ScenarioStep]> {
        self.scenarios.get(name).map(Vec::as_slice)
    }
}
