//! HTTP control plane.
//!
//! Thin axum adapters over the state store and the publisher; no protocol
//! logic lives here. Unknown profiles, domains, and scenarios map to 404
//! with a JSON `detail` body.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::Settings;
use crate::publisher::Publisher;
use crate::scenarios::ScenarioSet;
use opsim_core::SimulatorState;

/// Shared context for every handler.
#[derive(Clone)]
pub(crate) struct ApiContext {
    pub(crate) state: Arc<SimulatorState>,
    pub(crate) publisher: Publisher,
    pub(crate) scenarios: Arc<ScenarioSet>,
    pub(crate) settings: Arc<Settings>,
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;

/// Build the control-plane router.
pub(crate) fn router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/profiles", get(profiles))
        .route("/api/v1/profiles/active", put(set_active_profile))
        .route("/api/v1/sessions", get(sessions))
        .route("/api/v1/traffic", get(traffic))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/state/{domain}", get(get_domain).put(put_domain))
        .route("/api/v1/events/{event_type}", post(post_event))
        .route("/api/v1/scenarios", get(list_scenarios))
        .route("/api/v1/scenarios/run", post(run_scenario))
        .route("/api/v1/reset", post(reset))
        .route("/api/v1/capabilities", get(capabilities))
        .with_state(ctx)
}

fn not_found(detail: String) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({"detail": detail})))
}

async fn health(State(ctx): State<ApiContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "profile": ctx.state.active_profile_name(),
        "mid_count": ctx.state.catalog().len(),
        "sessions": ctx.state.session_count(),
        "ports": {
            "classic": ctx.settings.classic_port,
            "actor": ctx.settings.actor_port,
            "viewer": ctx.settings.viewer_port,
        },
        "keepalive": {
            "timeout_sec": ctx.settings.keepalive_timeout_secs,
            "inactivity_hint_sec": ctx.settings.inactivity_hint_secs,
        },
    }))
}

async fn profiles(State(ctx): State<ApiContext>) -> Json<Value> {
    Json(ctx.state.profile_overview())
}

#[derive(Deserialize)]
struct ProfileSwitchRequest {
    profile: String,
}

async fn set_active_profile(
    State(ctx): State<ApiContext>,
    Json(req): Json<ProfileSwitchRequest>,
) -> ApiResult {
    ctx.state
        .set_profile(&req.profile)
        .map_err(|_| not_found(format!("Unknown profile {}", req.profile)))?;
    Ok(Json(ctx.state.profile_overview()))
}

async fn sessions(State(ctx): State<ApiContext>) -> Json<Value> {
    Json(json!(ctx.state.session_snapshots()))
}

#[derive(Deserialize)]
struct TrafficParams {
    limit: Option<usize>,
    mid: Option<String>,
    session_id: Option<String>,
}

async fn traffic(
    State(ctx): State<ApiContext>,
    Query(params): Query<TrafficParams>,
) -> Json<Value> {
    let records = ctx.state.list_traffic(
        params.limit.unwrap_or(100),
        params.mid.as_deref(),
        params.session_id.as_deref(),
    );
    Json(json!(records))
}

async fn full_state(State(ctx): State<ApiContext>) -> Json<Value> {
    Json(Value::Object(ctx.state.domains()))
}

async fn get_domain(State(ctx): State<ApiContext>, Path(domain): Path<String>) -> ApiResult {
    ctx.state
        .domain(&domain)
        .map(Json)
        .map_err(|_| not_found(format!("Unknown domain {domain}")))
}

#[derive(Deserialize)]
struct DomainUpdateRequest {
    payload: Value,
}

async fn put_domain(
    State(ctx): State<ApiContext>,
    Path(domain): Path<String>,
    Json(req): Json<DomainUpdateRequest>,
) -> ApiResult {
    let updated = ctx
        .state
        .replace_domain(&domain, req.payload)
        .map_err(|_| not_found(format!("Unknown domain {domain}")))?;
    Ok(Json(json!({"domain": domain, "state": updated})))
}

#[derive(Deserialize, Default)]
struct EventRequest {
    #[serde(default)]
    payload: Value,
}

async fn post_event(
    State(ctx): State<ApiContext>,
    Path(event_type): Path<String>,
    Json(req): Json<EventRequest>,
) -> Json<Value> {
    let outcome = ctx.publisher.publish(&event_type, req.payload).await;
    Json(json!(outcome))
}

async fn list_scenarios(State(ctx): State<ApiContext>) -> Json<Value> {
    Json(json!({"scenarios": ctx.scenarios.names()}))
}

#[derive(Deserialize)]
struct ScenarioRunRequest {
    name: String,
    #[serde(default)]
    payload: Value,
}

async fn run_scenario(
    State(ctx): State<ApiContext>,
    Json(req): Json<ScenarioRunRequest>,
) -> ApiResult {
    let Some(steps) = ctx.scenarios.get(&req.name) else {
        return Err(not_found(format!("Unknown scenario {}", req.name)));
    };
    let steps = steps.to_vec();

    let mut results = Vec::with_capacity(steps.len());
    for step in &steps {
        if step.delay_sec > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(step.delay_sec)).await;
        }
        let payload = merge_payload(step.payload.clone(), req.payload.clone());
        let outcome = ctx.publisher.publish(&step.event, payload).await;
        results.push(json!(outcome));
    }
    Ok(Json(json!({
        "scenario": req.name,
        "steps_executed": steps.len(),
        "results": results,
    })))
}

async fn reset(State(ctx): State<ApiContext>) -> Json<Value> {
    ctx.state.reset();
    Json(json!({"status": "reset"}))
}

async fn capabilities(State(ctx): State<ApiContext>) -> Json<Value> {
    let matrix = ctx.state.capability_matrix();
    Json(json!({"count": matrix.len(), "items": matrix}))
}

/// Overlay the run request's payload object onto a step's base payload.
fn merge_payload(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            base.extend(overlay);
            Value::Object(base)
        },
        (base, Value::Null) => base,
        (Value::Null, overlay) => overlay,
        (base, _) => base,
    }
}
