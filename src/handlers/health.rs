//! `GET /health`: the ambient liveness probe every service in this codebase exposes. Carries
//! no dependency on the task registry, per §6.

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
