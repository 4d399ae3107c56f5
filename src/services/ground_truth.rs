//! The ground-truth overlay (component C6): replaces model output with measured values when
//! a task was loaded with recorded `EXPLAIN`/trace results and the request opts in via
//! `videx_options.use_gt`.

use tracing::warn;

use crate::models::meta::TableStats;
use crate::models::range::IndexRangeCond;
use crate::models::request::RequestRecord;

/// Looks up `cond` among the table's recorded ground truth for `cond.index_name`. Falls
/// through to `model_estimate` on any miss (unknown index, no matching range, or no GT table
/// at all), logging a warning per §4.6 - a ground-truth miss is not an error.
pub fn records_in_range(stats: &TableStats, cond: &IndexRangeCond, model_estimate: u64) -> u64 {
    let Some(gt) = &stats.gt_return else {
        return model_estimate;
    };
    let Some(entries) = gt
        .idx_gt_pair
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&cond.index_name))
        .map(|(_, entries)| entries)
    else {
        return model_estimate;
    };

    for entry in entries {
        if cond.matches(&entry.range_str, true) {
            return entry.rows.max(0) as u64;
        }
    }

    warn!(
        "ground truth recorded for index {} but no range matched, falling back to model",
        cond.index_name
    );
    model_estimate
}

/// A JSON-canonicalized fingerprint of a request, used to key the arbitrary-request replay
/// table described in §4.6. Keys are serialized in a fixed order by routing through
/// `serde_json::Value`, which sorts object keys on `to_string()` when built from a `BTreeMap`;
/// we go through `Map` with `preserve_order` disabled so the default (sorted) behavior applies.
pub fn fingerprint(request: &RequestRecord) -> String {
    serde_json::to_string(request).unwrap_or_default()
}

/// Looks up a recorded `(fingerprint -> response)` replay for a request that doesn't fit the
/// `records_in_range` shape above.
pub fn lookup_fingerprint_response<'a>(
    stats: &'a TableStats,
    request: &RequestRecord,
) -> Option<&'a std::collections::HashMap<String, String>> {
    let gt = stats.gt_return.as_ref()?;
    gt.req_resp.get(&fingerprint(request))
}
