//! Per-column histograms (component C2): equi-height, singleton and equi-width bucket lists,
//! and the `fraction_below` interpolation that turns a literal value into a cumulative
//! selectivity. Ported from the bucket arithmetic in the upstream histogram generator, using
//! the per-type width/offset formulas documented in §4.2.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramType {
    EquiHeight,
    Singleton,
    EquiWidth,
    BruteForceEquiWidth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub min: Value,
    pub max: Value,
    pub cum_freq: f64,
    pub row_count: f64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramStats {
    pub buckets: Vec<HistogramBucket>,
    pub data_type: String,
    pub histogram_type: HistogramType,
    pub null_values: f64,
    pub sampling_rate: f64,
    pub number_of_buckets_specified: u32,
}

const RESCALE_TOLERANCE: f64 = 0.01;

impl HistogramStats {
    /// Normalizes `null_values + buckets.last().cum_freq` back to 1.0 when it has drifted by
    /// up to 1%, matching the load-time rescale the bucket generator performs.
    pub fn normalize(&mut self) {
        let Some(last) = self.buckets.last() else {
            return;
        };
        let total = self.null_values + last.cum_freq;
        if total <= 0.0 {
            return;
        }
        let drift = (total - 1.0).abs();
        if drift > 0.0 && drift <= RESCALE_TOLERANCE {
            let scale = 1.0 / total;
            for bucket in &mut self.buckets {
                bucket.cum_freq *= scale;
            }
            self.null_values *= scale;
        }
    }

    fn value_type(&self) -> Option<ValueType> {
        crate::models::value::classify_data_type(&self.data_type).ok()
    }

    /// `fraction_below(value, side)`, per §4.2.
    pub fn fraction_below(&self, value: &Value, side: Side) -> f64 {
        if value.is_null() {
            let base = match side {
                Side::Left => 0.0,
                Side::Right => self.null_values,
            };
            return base;
        }

        let Some(first) = self.buckets.first() else {
            return self.null_values;
        };
        let last = self.buckets.last().expect("checked non-empty above");

        if let Ok(ord) = value.compare(&last.max) {
            if ord.is_gt() {
                return 1.0;
            }
        }
        if let Ok(ord) = value.compare(&first.min) {
            if ord.is_lt() {
                return self.null_values;
            }
        }

        for (i, bucket) in self.buckets.iter().enumerate() {
            let above_min = value.compare(&bucket.min).map(|o| !o.is_lt()).unwrap_or(false);
            let below_max = value.compare(&bucket.max).map(|o| !o.is_gt()).unwrap_or(false);
            if above_min && below_max {
                let prev_cum = if i == 0 { 0.0 } else { self.buckets[i - 1].cum_freq };
                let (width, offset) = self.interpolate(bucket, value);
                let frac = match side {
                    Side::Left => offset,
                    Side::Right => offset + width,
                };
                let frac = frac.clamp(0.0, 1.0);
                let cum = prev_cum + frac * (bucket.cum_freq - prev_cum);
                return (cum + self.null_values).min(1.0);
            }
            // gap between this bucket and the next: clamp to this bucket's max.
            let past_this_bucket = value.compare(&bucket.max).map(|o| o.is_gt()).unwrap_or(false);
            let before_next_bucket = self
                .buckets
                .get(i + 1)
                .map(|next| value.compare(&next.min).map(|o| o.is_lt()).unwrap_or(false))
                .unwrap_or(false);
            if past_this_bucket && before_next_bucket {
                warn!(
                    "value falls in a histogram gap between buckets {} and {}, clamping",
                    i,
                    i + 1
                );
                return (bucket.cum_freq + self.null_values).min(1.0);
            }
        }

        // Fell through every bucket without matching or detecting a gap: treat as at max.
        (last.cum_freq + self.null_values).min(1.0)
    }

    /// The bucket width an equality predicate on `value` occupies - the `one_value_width`
    /// used directly by the estimator for singleton (equality) ranges, per §4.5.
    pub fn one_value_width(&self, value: &Value) -> f64 {
        for (i, bucket) in self.buckets.iter().enumerate() {
            let above_min = value.compare(&bucket.min).map(|o| !o.is_lt()).unwrap_or(false);
            let below_max = value.compare(&bucket.max).map(|o| !o.is_gt()).unwrap_or(false);
            if above_min && below_max {
                let prev_cum = if i == 0 { 0.0 } else { self.buckets[i - 1].cum_freq };
                let width = self.interpolate(bucket, value).0;
                return width * (bucket.cum_freq - prev_cum);
            }
        }
        self.buckets
            .first()
            .map(|b| 1.0 / b.row_count.max(1.0))
            .unwrap_or(1.0)
    }

    /// Per-type `(width, offset)` inside `bucket` for `value`, per the table in §4.2.
    fn interpolate(&self, bucket: &HistogramBucket, value: &Value) -> (f64, f64) {
        if bucket.min.compare(&bucket.max).map(|o| o.is_eq()).unwrap_or(false) {
            return (1.0, 0.0);
        }
        let row_count = bucket.row_count.max(1.0);
        match self.value_type() {
            Some(ValueType::Int) => {
                let (min, max, v) = match (bucket.min.as_f64(), bucket.max.as_f64(), value.as_f64()) {
                    (Some(a), Some(b), Some(c)) => (a, b, c),
                    _ => return (1.0 / row_count, 0.0),
                };
                let span = (max - min + 1.0).max(1.0);
                let width = (1.0 / row_count).max(1.0 / span);
                let offset = (v - min) / span;
                (width, offset.clamp(0.0, 1.0 - width))
            }
            Some(ValueType::Float) => {
                let (min, max, v) = match (bucket.min.as_f64(), bucket.max.as_f64(), value.as_f64()) {
                    (Some(a), Some(b), Some(c)) => (a, b, c),
                    _ => return (1.0 / row_count, 0.0),
                };
                let width = 1.0 / row_count;
                let span = (max - min).max(f64::EPSILON);
                let offset = (v - min) / span;
                (width, offset.clamp(0.0, 1.0 - width))
            }
            Some(ValueType::Date) | Some(ValueType::DateTime) => {
                let (min_secs, max_secs, v_secs) = match (&bucket.min, &bucket.max, value) {
                    (Value::Date(min), Value::Date(max), Value::Date(v)) => (
                        min.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp(),
                        max.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp(),
                        v.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp(),
                    ),
                    (Value::DateTime(min), Value::DateTime(max), Value::DateTime(v)) => (
                        min.and_utc().timestamp(),
                        max.and_utc().timestamp(),
                        v.and_utc().timestamp(),
                    ),
                    _ => return (1.0 / row_count, 0.0),
                };
                let span = max_secs - min_secs;
                if span <= 0 {
                    return (1.0 / row_count, 0.0);
                }
                let width = (1.0 / row_count).max(1.0 / span as f64);
                let offset = (v_secs - min_secs) as f64 / span as f64;
                (width, offset.clamp(0.0, 1.0 - width))
            }
            _ => {
                // string, json, and anything without a numeric ordering: 0 / 0.5 / 1.
                let width: f64 = 1.0 / row_count;
                let at_min = value.compare(&bucket.min).map(|o| o.is_eq()).unwrap_or(false);
                let at_max = value.compare(&bucket.max).map(|o| o.is_eq()).unwrap_or(false);
                let offset: f64 = if at_min {
                    0.0
                } else if at_max {
                    1.0
                } else {
                    0.5
                };
                (width, offset.clamp(0.0, 1.0 - width))
            }
        }
    }
}
