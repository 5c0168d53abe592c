//! Runtime configuration from environment variables.
//!
//! Every knob has a default suitable for local development. Numeric and
//! boolean variables parse leniently: an unparsable value falls back to the
//! default instead of refusing to start. Command-line flags (see `main.rs`)
//! override the environment.

use std::path::PathBuf;
use std::time::Duration;

use opsim_core::SimLimits;

/// Server settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind host for every listener.
    pub host: String,
    /// HTTP control-plane port.
    pub api_port: u16,
    /// Classic-role Open Protocol port.
    pub classic_port: u16,
    /// Actor-role Open Protocol port.
    pub actor_port: u16,
    /// Viewer-role Open Protocol port.
    pub viewer_port: u16,
    /// Active profile at startup.
    pub profile: String,
    /// Whether to persist state and traffic to disk.
    pub persist: bool,
    /// Database path when persistence is enabled.
    pub db_path: PathBuf,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Keep-alive watchdog timeout in seconds.
    pub keepalive_timeout_secs: u64,
    /// Advisory keep-alive interval hint in seconds (metadata only).
    pub inactivity_hint_secs: u64,
    /// Directory holding the MID catalog, profiles, and scenarios.
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            api_port: 8000,
            classic_port: 4545,
            actor_port: 4546,
            viewer_port: 4547,
            profile: "atlas_pf".to_string(),
            persist: false,
            db_path: PathBuf::from("/data/opsim.db"),
            max_sessions: 10,
            keepalive_timeout_secs: 15,
            inactivity_hint_secs: 10,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults for
    /// missing or malformed values.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_str("HOST", &defaults.host),
            api_port: env_parse("API_PORT", defaults.api_port),
            classic_port: env_parse("SIM_CLASSIC_PORT", defaults.classic_port),
            actor_port: env_parse("SIM_ACTOR_PORT", defaults.actor_port),
            viewer_port: env_parse("SIM_VIEWER_PORT", defaults.viewer_port),
            profile: env_str("SIM_PROFILE", &defaults.profile),
            persist: env_bool("SIM_PERSIST", defaults.persist),
            db_path: PathBuf::from(env_str("SIM_DB_PATH", "/data/opsim.db")),
            max_sessions: env_parse("SIM_MAX_SESSIONS", defaults.max_sessions),
            keepalive_timeout_secs: env_parse(
                "SIM_KEEPALIVE_TIMEOUT_SEC",
                defaults.keepalive_timeout_secs,
            ),
            inactivity_hint_secs: env_parse(
                "SIM_INACTIVITY_KEEPALIVE_HINT_SEC",
                defaults.inactivity_hint_secs,
            ),
            data_dir: PathBuf::from(env_str("SIM_DATA_DIR", "data")),
        }
    }

    /// Limits handed to the state store.
    #[must_use]
    pub fn limits(&self) -> SimLimits {
        SimLimits {
            max_sessions: self.max_sessions,
            keepalive_timeout: Duration::from_secs(self.keepalive_timeout_secs),
            inactivity_hint: Duration::from_secs(self.inactivity_hint_secs),
        }
    }
}

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok()).unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
