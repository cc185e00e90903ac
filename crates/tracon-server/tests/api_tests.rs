//! Integration tests for the RPC server HTTP endpoints.
//!
//! Uses `tower::ServiceExt::oneshot` to send requests directly to the
//! router without binding a TCP port.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use tracon_server::{AppState, SimManager, build_router};
use tracon_sim::ServerConfig;

const FACILITY: &str = r"
broadcast_password: hunter2
simulation:
  prespawn_seconds: 0
  seed: 11
tracons:
  N90:
    JFK:
      center: { lon: -73.78, lat: 40.64 }
      control_positions:
        2J: { position: Kennedy Final, radio_name: New York Approach, frequency: 132400, facility: N90 }
        4P: { position: Kennedy Departure, radio_name: New York Departure, frequency: 135900, facility: N90 }
      scenarios:
        JFK 22L:
          solo_controller: 2J
          default_split: TWO
          split_configurations:
            TWO:
              2J: { primary: true }
              4P: { backup: 2J }
";

fn state() -> Arc<AppState> {
    let config = ServerConfig::parse(FACILITY).unwrap();
    Arc::new(AppState::new(Arc::new(SimManager::new(config))))
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = build_router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn rpc(state: &Arc<AppState>, method: &str, body: &Value) -> (StatusCode, Value) {
    let response = build_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/rpc/{method}"))
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn start(state: &Arc<AppState>, name: &str) -> String {
    let (status, body) = rpc(
        state,
        "new_sim",
        &json!({
            "new_sim_name": name,
            "tracon": "N90",
            "group_name": "JFK",
            "scenario_name": "JFK 22L",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["controller_token"].as_str().unwrap().to_owned()
}

// =============================================================================
// Status endpoints
// =============================================================================

#[tokio::test]
async fn index_returns_html() {
    let state = state();
    let (status, body) = get(&state, "/").await;

    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("<!DOCTYPE html>"));
    assert!(html.contains("TRACON Server"));
    assert!(html.contains("/rpc/run_aircraft_commands"));
}

#[tokio::test]
async fn health_reports_session_count() {
    let state = state();
    let (_, body) = get(&state, "/health").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sims"], 0);
    assert_eq!(json["local"], false);

    start(&state, "alpha").await;
    let (_, body) = get(&state, "/health").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["sims"], 1);
}

// =============================================================================
// Error mapping
// =============================================================================

#[tokio::test]
async fn unknown_method_is_not_found() {
    let state = state();
    let (status, body) = rpc(&state, "launch_missiles", &json!({})).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert!(body["error"].as_str().unwrap().contains("launch_missiles"));
}

#[tokio::test]
async fn malformed_arguments_are_bad_request() {
    let state = state();
    let (status, body) = rpc(&state, "get_world_update", &json!({ "token": 5 })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let state = state();
    let (status, body) = rpc(
        &state,
        "get_world_update",
        &json!({ "controller_token": "bm9wZQ==" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn duplicate_sim_name_conflicts() {
    let state = state();
    start(&state, "alpha").await;

    let (status, _) = rpc(
        &state,
        "new_sim",
        &json!({
            "new_sim_name": "alpha",
            "tracon": "N90",
            "group_name": "JFK",
            "scenario_name": "JFK 22L",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// =============================================================================
// Session flow
// =============================================================================

#[tokio::test]
async fn new_sim_then_world_update() {
    let state = state();
    let token = start(&state, "alpha").await;

    let (status, update) = rpc(
        &state,
        "get_world_update",
        &json!({ "controller_token": token }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(update["human_controllers"], json!(["2J"]));
    assert_eq!(update["sim_is_paused"], false);
}

#[tokio::test]
async fn running_sims_lists_open_positions() {
    let state = state();
    start(&state, "alpha").await;

    let (status, sims) = rpc(&state, "running_sims", &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sims["alpha"]["scenario_name"], "JFK 22L");
    assert_eq!(sims["alpha"]["require_password"], false);
}

#[tokio::test]
async fn commands_for_unknown_aircraft_report_the_failure() {
    let state = state();
    let token = start(&state, "alpha").await;

    let (status, result) = rpc(
        &state,
        "run_aircraft_commands",
        &json!({ "controller_token": token, "callsign": "ZZZ999", "commands": "A80 H270" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        result["error_message"],
        "No aircraft exists with specified callsign"
    );
    assert_eq!(result["remaining_input"], "A80 H270");
}

#[tokio::test]
async fn restriction_areas_are_indexed_from_one() {
    let state = state();
    let token = start(&state, "alpha").await;
    let area = json!({ "title": "TFR", "circle_center": { "lon": -73.8, "lat": 40.6 }, "radius": 3.0 });

    let (status, created) = rpc(
        &state,
        "create_restriction_area",
        &json!({ "controller_token": token, "area": area }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["index"], 1);

    let (status, _) = rpc(
        &state,
        "delete_restriction_area",
        &json!({ "controller_token": token, "index": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = rpc(
        &state,
        "delete_restriction_area",
        &json!({ "controller_token": token, "index": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid restriction area index");
}

#[tokio::test]
async fn sign_off_invalidates_the_token() {
    let state = state();
    let token = start(&state, "alpha").await;

    let (status, body) = rpc(&state, "sign_off", &json!({ "controller_token": token })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, _) = rpc(&state, "toggle_pause", &json!({ "controller_token": token })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
