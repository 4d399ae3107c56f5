//! `GET /videx/visualization/get_stats`: a debugging snapshot of registered tasks, per §6.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::handlers::AppState;

pub async fn get_stats(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.registry.snapshot();
    let tasks: Vec<Value> = snapshot
        .into_iter()
        .map(|(task_id, tables)| {
            json!({
                "task_id": task_id,
                "tables": tables.into_iter().map(|(db, table)| json!({"db": db, "table": table})).collect::<Vec<_>>(),
            })
        })
        .collect();
    Json(json!({ "tasks": tasks }))
}
