//! `POST /ask_videx`: parses a request record and routes it through the dispatcher, per §4.8.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::error;

use crate::handlers::AppState;
use crate::models::request::{RequestRecord, ResponseEnvelope};
use crate::services::dispatcher::dispatch;

pub async fn ask_videx(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> (StatusCode, Json<ResponseEnvelope>) {
    let request: RequestRecord = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "failed to parse ask_videx request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ResponseEnvelope::not_supported(format!("invalid request body: {e}"))),
            );
        }
    };

    let response = dispatch(&request, &state.registry, state.estimator.as_ref());
    (StatusCode::OK, Json(response))
}
