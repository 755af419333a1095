// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. Public endpoints (health) require no
// authentication. All other endpoints require a valid Bearer token checked via
// the `AuthBearer` extractor.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::runtime_config::RuntimeConfig;
use crate::types::{AccountMode, TradingMode};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/positions", get(positions))
        .route("/api/v1/positions/history", get(positions_history))
        .route("/api/v1/decisions", get(decisions))
        .route("/api/v1/errors", get(errors))
        .route("/api/v1/risk", get(risk_snapshot))
        .route("/api/v1/toggles", get(get_toggles))
        .route("/api/v1/toggles", post(set_toggles))
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/config", post(set_config))
        .route("/api/v1/control/pause", post(control_pause))
        .route("/api/v1/control/resume", post(control_resume))
        .route("/api/v1/control/kill", post(control_kill))
        .route("/api/v1/control/account-mode", post(control_account_mode))
        .route("/api/v1/heartbeat", post(heartbeat))
        .route("/api/v1/trade-journal", get(trade_journal))
        .route("/api/v1/trade-journal/stats", get(trade_journal_stats))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot (authenticated)
// =============================================================================

async fn full_state(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.build_snapshot();
    Json(snapshot)
}

// =============================================================================
// Positions (authenticated)
// =============================================================================

async fn positions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.positions.open_and_breakeven())
}

async fn positions_history(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.positions.history())
}

// =============================================================================
// Decisions / errors / risk (authenticated)
// =============================================================================

async fn decisions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let decisions = state.recent_decisions.read().clone();
    Json(decisions)
}

async fn errors(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let errors = state.recent_errors.read().clone();
    Json(errors)
}

async fn risk_snapshot(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.risk.snapshot())
}

// =============================================================================
// Operational toggles (authenticated)
// =============================================================================
//
// Unlike the legacy strategy feature-flag set, this engine only exposes the
// two switches that actually gate behavior here: whether the scoring
// pipeline is allowed to open new positions at all, and whether fills are
// forced synthetic regardless of account mode.

#[derive(Serialize)]
struct TogglesResponse {
    auto_buy_enabled: bool,
    shadow_mode: bool,
}

async fn get_toggles(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.runtime_config.read();
    Json(TogglesResponse {
        auto_buy_enabled: config.auto_buy_enabled,
        shadow_mode: config.shadow_mode,
    })
}

#[derive(Deserialize)]
struct TogglesUpdate {
    #[serde(default)]
    auto_buy_enabled: Option<bool>,
    #[serde(default)]
    shadow_mode: Option<bool>,
}

async fn set_toggles(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(update): Json<TogglesUpdate>,
) -> impl IntoResponse {
    let mut changes = Vec::new();
    let config_clone = {
        let mut config = state.runtime_config.write();
        if let Some(val) = update.auto_buy_enabled {
            if config.auto_buy_enabled != val {
                changes.push(format!("auto_buy_enabled: {} -> {}", config.auto_buy_enabled, val));
                config.auto_buy_enabled = val;
            }
        }
        if let Some(val) = update.shadow_mode {
            if config.shadow_mode != val {
                changes.push(format!("shadow_mode: {} -> {}", config.shadow_mode, val));
                config.shadow_mode = val;
            }
        }
        config.clone()
    };

    if !changes.is_empty() {
        info!(changes = ?changes, "toggles updated via API");
        if let Err(e) = config_clone.save("runtime_config.json") {
            warn!(error = %e, "failed to save runtime config after toggle update");
        }
        state.increment_version();
    }

    Json(serde_json::json!({
        "auto_buy_enabled": config_clone.auto_buy_enabled,
        "shadow_mode": config_clone.shadow_mode,
        "changes": changes,
    }))
}

// =============================================================================
// Full runtime config (authenticated)
// =============================================================================
//
// Unlike `/toggles`, which only exposes the two switches an operator
// flips routinely, this surfaces the entire `RuntimeConfig` — every field
// in spec §6's configuration surface — for read, and accepts a JSON merge
// patch (RFC 7396-style: recurse into nested objects, overwrite scalars)
// for write. The patch is applied to a clone and re-validated by
// round-tripping through `RuntimeConfig`'s own deserializer before it's
// installed, so a malformed patch never corrupts the live config.

async fn get_config(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.runtime_config.read().clone();
    Json(config)
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                merge_json(base_map.entry(key.clone()).or_insert(serde_json::Value::Null), value);
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

async fn set_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(patch): Json<serde_json::Value>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let current = state.runtime_config.read().clone();
    let mut merged_value = serde_json::to_value(&current)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))))?;
    merge_json(&mut merged_value, &patch);

    let merged: RuntimeConfig = serde_json::from_value(merged_value)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": format!("invalid config patch: {}", e) }))))?;

    {
        let mut config = state.runtime_config.write();
        *config = merged.clone();
    }
    state.increment_version();
    info!("runtime config patched via API");
    if let Err(e) = merged.save("runtime_config.json") {
        warn!(error = %e, "failed to save runtime config after patch");
    }

    Ok(Json(merged))
}

// =============================================================================
// Control endpoints (authenticated)
// =============================================================================

#[derive(Serialize)]
struct ControlResponse {
    trading_mode: String,
    message: String,
}

async fn control_pause(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Paused;
    }
    state.increment_version();
    info!("trading PAUSED via API");

    Json(ControlResponse {
        trading_mode: "Paused".to_string(),
        message: "Trading paused".to_string(),
    })
}

async fn control_resume(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Live;
    }
    state.increment_version();
    info!("trading RESUMED via API");

    Json(ControlResponse {
        trading_mode: "Live".to_string(),
        message: "Trading resumed".to_string(),
    })
}

async fn control_kill(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    {
        let mut config = state.runtime_config.write();
        config.trading_mode = TradingMode::Killed;
    }
    state.increment_version();
    warn!("trading KILLED via API");

    Json(ControlResponse {
        trading_mode: "Killed".to_string(),
        message: "Trading killed — manual restart required".to_string(),
    })
}

#[derive(Deserialize)]
struct AccountModeRequest {
    account_mode: String,
    #[serde(default)]
    confirm_live: bool,
}

#[derive(Serialize)]
struct AccountModeResponse {
    account_mode: String,
}

async fn control_account_mode(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccountModeRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let mode = match req.account_mode.to_lowercase().as_str() {
        "demo" => AccountMode::Demo,
        "live" => {
            if !req.confirm_live {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Switching to Live mode requires confirm_live: true",
                    })),
                ));
            }
            warn!("switching to LIVE account mode via API");
            AccountMode::Live
        }
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("Invalid account mode: '{}'. Use 'demo' or 'live'.", req.account_mode),
                })),
            ));
        }
    };

    {
        let mut config = state.runtime_config.write();
        config.account_mode = mode;
    }
    state.increment_version();
    info!(account_mode = %mode, "account mode changed via API");

    Ok(Json(AccountModeResponse {
        account_mode: mode.to_string(),
    }))
}

// =============================================================================
// Heartbeat (authenticated)
// =============================================================================

async fn heartbeat(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    *state.last_ws_user_event.write() = std::time::Instant::now();
    *state.ws_user_connected.write() = true;
    state.increment_version();

    Json(serde_json::json!({
        "status": "ok",
        "server_time": chrono::Utc::now().timestamp_millis(),
    }))
}

// =============================================================================
// Trade Journal (authenticated)
// =============================================================================

async fn trade_journal(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.positions.history())
}

async fn trade_journal_stats(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let closed = state.positions.history();
    let total_trades = closed.len();
    if total_trades == 0 {
        return Json(serde_json::json!({
            "total_trades": 0,
            "win_rate": 0.0,
            "total_net_pnl": 0.0,
            "profit_factor": 0.0,
        }));
    }
    let pnls: Vec<f64> = closed.iter().filter_map(|p| p.pnl_native).collect();
    let wins = closed.iter().filter(|p| p.pnl_percent.unwrap_or(0.0) > 0.0).count();
    let win_rate = wins as f64 / total_trades as f64;
    let total_net_pnl: f64 = pnls.iter().sum();
    let gross_profit: f64 = pnls.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    // No losing trades yet: profit factor is undefined rather than
    // infinite, so the field comes back `null` instead of silently
    // collapsing (serde_json has no representation for a non-finite f64).
    let profit_factor = if gross_loss > 0.0 {
        Some(gross_profit / gross_loss)
    } else if gross_profit > 0.0 {
        None
    } else {
        Some(0.0)
    };
    Json(serde_json::json!({
        "total_trades": total_trades,
        "win_rate": win_rate,
        "total_net_pnl": total_net_pnl,
        "profit_factor": profit_factor,
    }))
}
