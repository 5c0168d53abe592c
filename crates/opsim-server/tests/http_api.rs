//! Control-plane smoke tests over the bound API listener.
//!
//! Requests are written as raw HTTP/1.1 with `Connection: close`, so a plain
//! TCP read-to-end yields the full response; responses carry a
//! Content-Length (axum JSON bodies), never chunked encoding.

use std::future;
use std::net::SocketAddr;
use std::path::PathBuf;

use opsim_server::{Server, Settings};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data")
}

async fn start_api() -> SocketAddr {
    let settings = Settings {
        host: "127.0.0.1".to_string(),
        api_port: 0,
        classic_port: 0,
        actor_port: 0,
        viewer_port: 0,
        data_dir: data_dir(),
        ..Settings::default()
    };
    let server = Server::bind(settings).await.expect("bind server");
    let addr = server.api_addr().expect("api addr");
    tokio::spawn(server.run_until(future::pending::<()>()));
    addr
}

async fn request(addr: SocketAddr, method: &str, path: &str, body: Option<&Value>) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).await.expect("connect api");
    let payload = body.map(Value::to_string).unwrap_or_default();
    let head = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    );
    stream.write_all(head.as_bytes()).await.expect("write head");
    stream.write_all(payload.as_bytes()).await.expect("write body");

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.expect("read response");
    let response = String::from_utf8_lossy(&response).into_owned();

    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b)
        .filter(|b| !b.is_empty())
        .map_or(Value::Null, |b| serde_json::from_str(b).expect("json body"));
    (status, body)
}

async fn get(addr: SocketAddr, path: &str) -> (u16, Value) {
    request(addr, "GET", path, None).await
}

#[tokio::test]
async fn health_reports_profile_and_catalog() {
    let addr = start_api().await;
    let (status, body) = get(addr, "/api/v1/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["profile"], "atlas_pf");
    assert_eq!(body["mid_count"], 189);
    assert_eq!(body["sessions"], 0);
    assert!(body["ports"]["classic"].is_number());
    assert!(body["keepalive"]["inactivity_hint_sec"].is_number());
}

#[tokio::test]
async fn profile_switch_round_trip() {
    let addr = start_api().await;

    let (status, body) =
        request(addr, "PUT", "/api/v1/profiles/active", Some(&serde_json::json!({"profile": "cleco"})))
            .await;
    assert_eq!(status, 200);
    assert_eq!(body["active"], "cleco");

    // The state's metadata follows the active profile.
    let (_, metadata) = get(addr, "/api/v1/state/metadata").await;
    assert_eq!(metadata["profile"], "cleco");

    let (status, _) =
        request(addr, "PUT", "/api/v1/profiles/active", Some(&serde_json::json!({"profile": "bogus"})))
            .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn state_domain_read_and_replace() {
    let addr = start_api().await;

    let (status, tool) = get(addr, "/api/v1/state/tool").await;
    assert_eq!(status, 200);
    assert_eq!(tool["enabled"], true);

    let (status, body) = request(
        addr,
        "PUT",
        "/api/v1/state/tool",
        Some(&serde_json::json!({"payload": {"enabled": false, "primary_tool": "02"}})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["state"]["enabled"], false);

    let (status, _) = get(addr, "/api/v1/state/nope").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn events_mutate_state_and_report_outcome() {
    let addr = start_api().await;

    let (status, outcome) = request(
        addr,
        "POST",
        "/api/v1/events/tightening",
        Some(&serde_json::json!({"payload": {"torque_nm": 18.0, "ok": false}})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(outcome["event_type"], "tightening");
    assert_eq!(outcome["pushed_messages"], 0);
    assert_eq!(outcome["affected_mids"], serde_json::json!(["0061", "1201", "1202"]));

    let (_, results) = get(addr, "/api/v1/state/results").await;
    assert_eq!(results["last_tightening_id"], 2);
    assert_eq!(results["history"][0]["status"], "NOK");
}

#[tokio::test]
async fn scenarios_list_and_run() {
    let addr = start_api().await;

    let (status, body) = get(addr, "/api/v1/scenarios").await;
    assert_eq!(status, 200);
    let names: Vec<String> = body["scenarios"]
        .as_array()
        .expect("scenario list")
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    assert!(names.contains(&"io_toggle".to_string()));

    let (status, body) = request(
        addr,
        "POST",
        "/api/v1/scenarios/run",
        Some(&serde_json::json!({"name": "io_toggle"})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["steps_executed"], 2);

    let (_, io) = get(addr, "/api/v1/state/io").await;
    assert_eq!(io["inputs"]["input_01"], false);

    let (status, _) = request(
        addr,
        "POST",
        "/api/v1/scenarios/run",
        Some(&serde_json::json!({"name": "missing"})),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn reset_restores_initial_domains() {
    let addr = start_api().await;

    let (_, outcome) = request(
        addr,
        "POST",
        "/api/v1/events/tightening",
        Some(&serde_json::json!({"payload": {}})),
    )
    .await;
    assert_eq!(outcome["event_type"], "tightening");

    let (status, body) = request(addr, "POST", "/api/v1/reset", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "reset");

    let (_, results) = get(addr, "/api/v1/state/results").await;
    assert_eq!(results["last_tightening_id"], 1);
}

#[tokio::test]
async fn capabilities_matrix_covers_catalog() {
    let addr = start_api().await;
    let (status, body) = get(addr, "/api/v1/capabilities").await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 189);
    let items = body["items"].as_array().expect("items");
    assert_eq!(items.len(), 189);
    let first = &items[0];
    assert_eq!(first["mid"], "0001");
    assert_eq!(first["supported"], true);
    assert!(first["revisions"].as_array().is_some_and(|r| !r.is_empty()));
}

#[tokio::test]
async fn traffic_endpoint_returns_recent_frames() {
    let addr = start_api().await;
    let (status, body) = get(addr, "/api/v1/traffic?limit=10").await;
    assert_eq!(status, 200);
    assert_eq!(body, serde_json::json!([]));
}
