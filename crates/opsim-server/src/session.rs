//! Per-connection session handling: the read loop and the link layer glue.
//!
//! Each accepted connection gets one read-loop task. The write half lives in
//! the shared session map behind its own async mutex, because two producers
//! write to it: the read loop (replies to inbound frames) and the event
//! publisher (subscription pushes). Serializing on that mutex keeps frames
//! whole on the wire.
//!
//! Frame processing order per inbound frame: record rx traffic, resolve the
//! link-level acknowledge (which may veto dispatch for duplicates and
//! out-of-sequence frames), dispatch, stamp outbound sequence numbers, send
//! and record tx traffic.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, Notify, RwLock};

use opsim_core::{
    Direction, Dispatcher, ErrorCode, SessionContext, SessionRole, SimulatorState, error_reply,
    random_hex,
};
use opsim_proto::{Message, parse_stream_buffer};

/// Socket write half plus the close signal for one session.
pub(crate) struct SessionIo {
    pub(crate) writer: Mutex<OwnedWriteHalf>,
    pub(crate) close: Notify,
}

impl SessionIo {
    fn new(writer: OwnedWriteHalf) -> Self {
        Self { writer: Mutex::new(writer), close: Notify::new() }
    }
}

/// Map of session id to its I/O handles, shared by the read loops, the
/// publisher, and the keep-alive watchdog.
#[derive(Default)]
pub(crate) struct SharedSessions {
    io: RwLock<HashMap<String, Arc<SessionIo>>>,
}

impl SharedSessions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, session_id: &str, io: Arc<SessionIo>) {
        self.io.write().await.insert(session_id.to_string(), io);
    }

    pub(crate) async fn remove(&self, session_id: &str) {
        self.io.write().await.remove(session_id);
    }

    pub(crate) async fn get(&self, session_id: &str) -> Option<Arc<SessionIo>> {
        self.io.read().await.get(session_id).cloned()
    }

    /// Ask a session's read loop to terminate.
    pub(crate) async fn request_close(&self, session_id: &str) {
        if let Some(io) = self.get(session_id).await {
            io.close.notify_one();
        }
    }

    /// Ask every read loop to terminate (shutdown).
    pub(crate) async fn close_all(&self) {
        for io in self.io.read().await.values() {
            io.close.notify_one();
        }
    }
}

/// Drive one accepted connection until EOF, close request, or I/O error.
pub(crate) async fn handle_client(
    stream: TcpStream,
    role: SessionRole,
    state: Arc<SimulatorState>,
    dispatcher: Arc<Dispatcher>,
    shared: Arc<SharedSessions>,
) {
    let remote = stream.peer_addr().map_or_else(|_| "unknown".to_string(), |a| a.to_string());
    let session = Arc::new(SessionContext::new(random_hex(12), role, remote.clone()));

    if let Err(err) = state.register_session(Arc::clone(&session)) {
        tracing::warn!("rejecting {role} session ({remote}): {err}");
        let mut stream = stream;
        let reject = error_reply("0001", ErrorCode::TooManySessions);
        let _ = stream.write_all(&reject.raw).await;
        let _ = stream.shutdown().await;
        return;
    }

    tracing::info!("session connected {} ({role}, {remote})", session.session_id());
    let (mut reader, writer) = stream.into_split();
    let io = Arc::new(SessionIo::new(writer));
    shared.insert(session.session_id(), Arc::clone(&io)).await;

    let mut buffer = BytesMut::with_capacity(4096);
    loop {
        tokio::select! {
            () = io.close.notified() => break,
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) => break,
                Ok(_) => {
                    session.touch();
                    for msg in parse_stream_buffer(&mut buffer) {
                        process_frame(&state, &dispatcher, &session, &io, &msg).await;
                    }
                },
                Err(err) => {
                    tracing::debug!("read error on {}: {err}", session.session_id());
                    break;
                },
            },
        }
    }

    let _ = io.writer.lock().await.shutdown().await;
    shared.remove(session.session_id()).await;
    state.unregister_session(session.session_id());
    tracing::info!("session closed {}", session.session_id());
}

/// Process one complete inbound frame.
async fn process_frame(
    state: &SimulatorState,
    dispatcher: &Dispatcher,
    session: &SessionContext,
    io: &SessionIo,
    msg: &Message,
) {
    state.record_traffic(session, Direction::Rx, msg);

    let outcome = session.resolve_link_ack(msg);
    if let Some(ack) = outcome.ack {
        send_message(state, session, io, ack).await;
    }
    if !outcome.dispatch {
        return;
    }

    for reply in dispatcher.dispatch(session, msg) {
        let stamped = session.stamp_outbound(reply);
        send_message(state, session, io, stamped).await;
    }
}

/// Write one message to a session and record it as tx traffic.
pub(crate) async fn send_message(
    state: &SimulatorState,
    session: &SessionContext,
    io: &SessionIo,
    msg: Message,
) {
    let mut writer = io.writer.lock().await;
    match writer.write_all(&msg.raw).await {
        Ok(()) => state.record_traffic(session, Direction::Tx, &msg),
        Err(err) => tracing::debug!("write failed on {}: {err}", session.session_id()),
    }
}
