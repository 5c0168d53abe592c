//! Server error types.

use thiserror::Error;

use opsim_core::CoreError;

/// Errors that can occur while starting or running the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (bad data directory, unparsable data files).
    /// Fatal at startup; fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the simulator core (data files, unknown profile).
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}
