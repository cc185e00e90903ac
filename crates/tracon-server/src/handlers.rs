//! HTTP endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/health` | JSON liveness check |
//! | `POST` | `/rpc/{method}` | Call an RPC method with a JSON body |

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse};
use chrono::Utc;
use tracing::debug;

use crate::dispatcher::{self, METHODS};
use crate::error::ServerError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page with server status and the RPC method list.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sims = state.manager.session_count().await;
    let mode = if state.manager.is_local() {
        "local"
    } else {
        "multi-user"
    };
    let uptime = Utc::now().signed_duration_since(state.manager.started());
    let uptime = format!(
        "{}h {:02}m",
        uptime.num_hours(),
        uptime.num_minutes().rem_euclid(60)
    );
    let methods: String = METHODS
        .iter()
        .map(|m| format!("        <li><code>/rpc/{m}</code></li>\n"))
        .collect();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>TRACON Server</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.2rem 0; }}
        li::before {{ content: "POST "; color: #7ee787; font-weight: bold; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>TRACON Server</h1>
    <p class="subtitle">Radar training simulation server</p>

    <p>Status: <span class="status">RUNNING</span></p>

    <div>
        <div class="metric">
            <div class="label">Sims</div>
            <div class="value">{sims}</div>
        </div>
        <div class="metric">
            <div class="label">Mode</div>
            <div class="value">{mode}</div>
        </div>
        <div class="metric">
            <div class="label">Uptime</div>
            <div class="value">{uptime}</div>
        </div>
    </div>

    <hr>

    <h2>RPC Methods</h2>
    <ul>
{methods}    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness check.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sims": state.manager.session_count().await,
        "local": state.manager.is_local(),
    }))
}

// ---------------------------------------------------------------------------
// POST /rpc/{method}
// ---------------------------------------------------------------------------

/// Call `method` with the request body as its JSON arguments.
pub async fn rpc(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ServerError> {
    debug!(method = %method, bytes = body.len(), "RPC call");
    let result = dispatcher::dispatch(&state.manager, &method, &body).await?;
    Ok(Json(result))
}
