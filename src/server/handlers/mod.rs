//! 请求处理器模块

mod api;
mod turn_calls;

pub use api::{chat_completions, responses};

use crate::server::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "queue_depth": state.queue.depth(),
        "backend": state.config.backend.base_url,
    }))
}

pub async fn models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{
            "id": state.config.backend.model,
            "object": "model",
            "created": 0,
            "owned_by": "sessioncast",
        }]
    }))
}
