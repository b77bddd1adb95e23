//! API route definitions.

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use super::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.config;
    let queries: Vec<Value> = cfg
        .detection
        .queries
        .iter()
        .map(|q| json!({ "id": q.id, "category": q.category, "threshold": q.threshold }))
        .collect();

    Json(json!({
        "data": {
            "stats": state.stats.snapshot(),
            "detection": {
                "interval_secs": cfg.detection.interval_secs,
                "queries": queries,
            },
            "report": {
                "interval_secs": cfg.report.interval_secs,
                "cron": cfg.report.cron,
            },
        },
        "meta": {
            "started_at": state.started_at.to_rfc3339(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }
    }))
}
