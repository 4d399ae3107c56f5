//! `POST /create_task_meta`: ingests a (possibly gzip-encoded) task metadata document and
//! registers it, replacing any prior entry for the same `task_id`, per §4.7/§6.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::handlers::AppState;
use crate::services::metadata_builder::{construct_task_meta, TaskDocument};

pub async fn create_task_meta(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let decompressed = match state.registry.decode_payload(&body) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "failed to decode task payload");
            return (StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST), Json(json!({ "code": e.status_code(), "message": e.to_string() })));
        }
    };

    let doc: TaskDocument = match serde_json::from_slice(&decompressed) {
        Ok(doc) => doc,
        Err(e) => {
            error!(error = %e, "failed to parse task document");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "code": 400, "message": format!("invalid task document: {e}") })),
            );
        }
    };

    let task_id = doc.task_id.clone();
    let meta = match construct_task_meta(doc) {
        Ok(meta) => meta,
        Err(e) => {
            error!(error = %e, "failed to construct task metadata");
            return (
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST),
                Json(json!({ "code": e.status_code(), "message": e.to_string() })),
            );
        }
    };

    if let Err(e) = state.registry.add_task_meta(meta) {
        error!(error = %e, "failed to register task metadata");
        return (
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST),
            Json(json!({ "code": e.status_code(), "message": e.to_string() })),
        );
    }

    info!(task_id, "registered task metadata");
    (StatusCode::OK, Json(json!({ "code": 200, "message": "ok" })))
}
