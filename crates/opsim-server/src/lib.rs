//! Open Protocol simulator server.
//!
//! Production glue over [`opsim_core`]: three role-segregated TCP listeners
//! (classic / actor / viewer), one read-loop task per connection, a 1 Hz
//! keep-alive watchdog, the event publisher, the axum control plane, and
//! optional redb persistence.
//!
//! # Components
//!
//! - [`Server`]: binds every listener and runs the whole simulator
//! - [`Publisher`]: event injection and subscription fan-out
//! - [`Settings`]: environment-driven configuration
//! - [`storage`]: persistence backends ([`RedbStorage`], [`MemoryStorage`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod publisher;
mod scenarios;
mod session;
pub mod storage;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub use config::Settings;
pub use error::ServerError;
pub use publisher::{PublishOutcome, Publisher};
pub use scenarios::{ScenarioSet, ScenarioStep};
pub use storage::{MemoryStorage, RedbStorage};
use tokio::net::TcpListener;

use crate::session::SharedSessions;
use opsim_core::{
    Dispatcher, MidCatalog, Persistence, ProfileStore, SessionRole, SimulatorState,
};

/// The bound simulator: listeners, state, dispatcher, publisher.
pub struct Server {
    state: Arc<SimulatorState>,
    dispatcher: Arc<Dispatcher>,
    publisher: Publisher,
    shared: Arc<SharedSessions>,
    scenarios: Arc<ScenarioSet>,
    settings: Arc<Settings>,
    classic: TcpListener,
    actor: TcpListener,
    viewer: TcpListener,
    api: TcpListener,
}

impl Server {
    /// Load the data files, open persistence, and bind every listener.
    ///
    /// A missing or malformed data file is fatal. An unopenable database is
    /// not: persistence degrades to disabled with a warning.
    pub async fn bind(settings: Settings) -> Result<Self, ServerError> {
        let catalog = MidCatalog::from_file(&settings.data_dir.join("mid_catalog.json"))?;
        let profiles =
            ProfileStore::from_directory(&settings.data_dir.join("profiles"), &settings.profile)?;
        let scenarios = Arc::new(ScenarioSet::from_file(&settings.data_dir.join("scenarios.json"))?);

        let persistence: Option<Arc<dyn Persistence>> = if settings.persist {
            match RedbStorage::open(&settings.db_path) {
                Ok(storage) => Some(Arc::new(storage)),
                Err(err) => {
                    tracing::warn!("persistence unavailable, continuing without: {err}");
                    None
                },
            }
        } else {
            None
        };

        let state =
            Arc::new(SimulatorState::new(catalog, profiles, persistence, settings.limits()));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&state)));
        let shared = Arc::new(SharedSessions::new());
        let publisher = Publisher::new(Arc::clone(&state), Arc::clone(&shared));

        let host = settings.host.as_str();
        let classic = TcpListener::bind((host, settings.classic_port)).await?;
        let actor = TcpListener::bind((host, settings.actor_port)).await?;
        let viewer = TcpListener::bind((host, settings.viewer_port)).await?;
        let api = TcpListener::bind((host, settings.api_port)).await?;

        tracing::info!("classic sessions on {}", classic.local_addr()?);
        tracing::info!("actor sessions on {}", actor.local_addr()?);
        tracing::info!("viewer sessions on {}", viewer.local_addr()?);
        tracing::info!("control plane on {}", api.local_addr()?);

        Ok(Self {
            state,
            dispatcher,
            publisher,
            shared,
            scenarios,
            settings: Arc::new(settings),
            classic,
            actor,
            viewer,
            api,
        })
    }

    /// Bound address of the classic listener.
    pub fn classic_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.classic.local_addr()?)
    }

    /// Bound address of the actor listener.
    pub fn actor_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.actor.local_addr()?)
    }

    /// Bound address of the viewer listener.
    pub fn viewer_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.viewer.local_addr()?)
    }

    /// Bound address of the HTTP control plane.
    pub fn api_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.api.local_addr()?)
    }

    /// The shared simulator state.
    #[must_use]
    pub fn state(&self) -> Arc<SimulatorState> {
        Arc::clone(&self.state)
    }

    /// A handle to the event publisher.
    #[must_use]
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves, then close listeners and sessions.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let mut tasks = Vec::new();
        for (listener, role) in [
            (self.classic, SessionRole::Classic),
            (self.actor, SessionRole::Actor),
            (self.viewer, SessionRole::Viewer),
        ] {
            tasks.push(tokio::spawn(accept_loop(
                listener,
                role,
                Arc::clone(&self.state),
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.shared),
            )));
        }
        tasks.push(tokio::spawn(keepalive_watchdog(
            Arc::clone(&self.state),
            Arc::clone(&self.shared),
        )));

        let app = http::router(http::ApiContext {
            state: Arc::clone(&self.state),
            publisher: self.publisher.clone(),
            scenarios: Arc::clone(&self.scenarios),
            settings: Arc::clone(&self.settings),
        });
        let result = axum::serve(self.api, app).with_graceful_shutdown(shutdown).await;

        // Shutdown: stop accepting and close the remaining sessions; each
        // read loop unregisters its own session on exit.
        for task in &tasks {
            task.abort();
        }
        self.shared.close_all().await;

        result.map_err(ServerError::from)
    }
}

/// Accept connections on one listener, spawning a session task per client.
async fn accept_loop(
    listener: TcpListener,
    role: SessionRole,
    state: Arc<SimulatorState>,
    dispatcher: Arc<Dispatcher>,
    shared: Arc<SharedSessions>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(session::handle_client(
                    stream,
                    role,
                    Arc::clone(&state),
                    Arc::clone(&dispatcher),
                    Arc::clone(&shared),
                ));
            },
            Err(err) => {
                tracing::error!("accept error on {role} listener: {err}");
            },
        }
    }
}

/// Close sessions whose last activity is older than the keep-alive timeout.
/// Runs at 1 Hz.
async fn keepalive_watchdog(state: Arc<SimulatorState>, shared: Arc<SharedSessions>) {
    let timeout = state.limits().keepalive_timeout;
    let cutoff_delta = chrono::Duration::seconds(timeout.as_secs() as i64);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let cutoff = chrono::Utc::now() - cutoff_delta;
        for session in state.session_handles() {
            if session.last_activity() < cutoff {
                tracing::info!(
                    "closing session {} after keep-alive timeout",
                    session.session_id()
                );
                shared.request_close(session.session_id()).await;
            }
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
