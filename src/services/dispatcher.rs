//! The request dispatcher (component C8): inspects `properties.function` and routes to the
//! matching estimator primitive, always returning a `200`-coded envelope except for
//! transport/ingest failures, per §4.8.

use tracing::{debug, warn};

use crate::models::request::{
    find_child, parse_key_bound, parse_videx_options, RequestRecord, ResponseEnvelope,
};
use crate::services::estimator::EstimatorStrategy;
use crate::services::ground_truth;
use crate::services::range_decoder::{decode_index_range_cond, resolve_index};
use crate::services::task_registry::TaskRegistry;

/// Dispatches one `ask_videx` request record against `registry`, using `estimator` for any
/// model-based computation. Never returns an `Err`: every failure degrades to a "not
/// supported" or best-effort-default envelope, per §7's propagation policy.
pub fn dispatch(
    request: &RequestRecord,
    registry: &TaskRegistry,
    estimator: &dyn EstimatorStrategy,
) -> ResponseEnvelope {
    let props = &request.properties;
    let function = props.function.as_deref().unwrap_or("");
    debug!(function, "dispatching ask_videx request");

    let videx_options = parse_videx_options(props.videx_options.as_deref());
    let (db, table) = match (props.dbname.as_deref(), props.table_name.as_deref()) {
        (Some(db), Some(table)) => (db, table),
        _ => {
            warn!("request missing dbname/table_name");
            return ResponseEnvelope::not_supported("missing dbname or table_name");
        }
    };

    let Some(task_id) = videx_options.task_id.as_deref() else {
        warn!("request missing videx_options.task_id");
        return ResponseEnvelope::not_supported("missing videx_options.task_id");
    };

    let Some(task_meta) = registry.lookup(task_id, db, table) else {
        warn!(task_id, db, table, "no metadata registered for task");
        return fallback_envelope(function);
    };
    let Some(stats) = task_meta.get_table(db, table) else {
        warn!(task_id, db, table, "no metadata registered for task");
        return fallback_envelope(function);
    };

    if function.contains("scan_time") {
        return ResponseEnvelope::ok_single("scan_time", estimator.scan_time(stats).to_string());
    }

    if function.contains("get_memory_buffer_size") {
        return ResponseEnvelope::ok_single(
            "memory_buffer_size",
            estimator.memory_buffer_size(stats).to_string(),
        );
    }

    if function.contains("info_low") {
        return ResponseEnvelope::ok(estimator.info_low(stats, &stats.indexes));
    }

    if function.contains("records_in_range") {
        let min_key = find_child(request, "min_key").and_then(|r| parse_key_bound(r).ok());
        let max_key = find_child(request, "max_key").and_then(|r| parse_key_bound(r).ok());
        let index_name = min_key
            .as_ref()
            .and_then(|k| k.index_name.as_deref())
            .or_else(|| max_key.as_ref().and_then(|k| k.index_name.as_deref()));
        let Some(index) = resolve_index(&stats.indexes, index_name) else {
            warn!(task_id, db, table, "no index available for records_in_range");
            return ResponseEnvelope::ok_single("value", "1");
        };

        let cond = match decode_index_range_cond(min_key.as_ref(), max_key.as_ref(), index, |c| {
            stats.find_column(c).map(|col| col.data_type.clone())
        }) {
            Ok(cond) => cond,
            Err(e) => {
                warn!(error = %e, "failed to decode index range, falling back to full scan estimate");
                return ResponseEnvelope::ok_single("value", stats.records.to_string());
            }
        };

        let model_estimate = estimator.records_in_range(stats, &cond);
        let value = if videx_options.use_gt {
            ground_truth::records_in_range(stats, &cond, model_estimate)
        } else {
            model_estimate
        };
        return ResponseEnvelope::ok_single("value", value.to_string());
    }

    warn!(function, "unrecognized function, returning not-supported");
    ResponseEnvelope::not_supported(format!("function not supported: {function}"))
}

/// The safe-default response for a task/table miss, per §7's `NotFound` policy: records_in_range
/// degrades to `1`, everything else to an explanatory not-supported envelope.
fn fallback_envelope(function: &str) -> ResponseEnvelope {
    if function.contains("records_in_range") {
        ResponseEnvelope::ok_single("value", "1")
    } else {
        ResponseEnvelope::not_supported("no metadata registered for task")
    }
}
