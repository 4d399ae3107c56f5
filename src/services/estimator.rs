//! The estimator strategy (component C5): turns a decoded predicate plus table statistics
//! into the row/cardinality/NDV/cost figures the optimizer asks for. Two strategies share
//! one trait so a caller (or a test) can swap the trivial `Example` reference in for the real
//! `InnoDbLike` model, the way the upstream engine keeps a toy storage engine alongside the
//! production one.

use std::collections::HashMap;

use tracing::warn;

use crate::models::histogram::HistogramStats;
use crate::models::meta::{Index, TableStats};
use crate::models::range::{IndexRangeCond, RangeCond};
use crate::models::value::Value;

const SELECTIVITY_EPSILON: f64 = 1e-9;
/// Wide default for a range predicate degraded to the independence estimate when a column's
/// histogram is missing, per §4.5.
const DEGRADED_RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

pub trait EstimatorStrategy: Send + Sync {
    fn scan_time(&self, stats: &TableStats) -> f64;
    fn memory_buffer_size(&self, stats: &TableStats) -> i64;
    fn records_in_range(&self, stats: &TableStats, cond: &IndexRangeCond) -> u64;
    fn cardinality(&self, stats: &TableStats, cond: &IndexRangeCond) -> u64 {
        self.records_in_range(stats, cond)
    }
    fn ndv(&self, stats: &TableStats, index: &str, prefix_cols: &[&str]) -> u64;
    fn info_low(&self, stats: &TableStats, indexes: &[Index]) -> HashMap<String, String>;
}

/// Trivial constant-valued strategy, useful as a reference baseline and in tests that don't
/// care about the real model's arithmetic.
pub struct ExampleEstimator;

impl EstimatorStrategy for ExampleEstimator {
    fn scan_time(&self, _stats: &TableStats) -> f64 {
        1.0
    }

    fn memory_buffer_size(&self, _stats: &TableStats) -> i64 {
        -1
    }

    fn records_in_range(&self, stats: &TableStats, _cond: &IndexRangeCond) -> u64 {
        stats.records
    }

    fn ndv(&self, stats: &TableStats, _index: &str, _prefix_cols: &[&str]) -> u64 {
        stats.records.min(1)
    }

    fn info_low(&self, stats: &TableStats, _indexes: &[Index]) -> HashMap<String, String> {
        let mut data = HashMap::new();
        data.insert("stat_n_rows".to_string(), stats.records.to_string());
        data
    }
}

/// The InnoDB-like strategy: histogram-driven selectivity with the documented independence
/// assumption across columns.
pub struct InnoDbLikeEstimator;

impl InnoDbLikeEstimator {
    fn range_selectivity(&self, stats: &TableStats, range: &RangeCond) -> f64 {
        let Some(hist) = stats.get_col_hist(&range.col) else {
            warn!(
                "no histogram for column {}, degrading to ndv-based independence estimate",
                range.col
            );
            let ndv = stats.get_ndv_single(&range.col).unwrap_or(1).max(1);
            return if range.is_singlepoint() {
                1.0 / ndv as f64
            } else {
                DEGRADED_RANGE_SELECTIVITY
            };
        };

        if range.is_singlepoint() {
            let value = range.min_value.as_ref().expect("singlepoint range always has min_value");
            return hist.one_value_width(value);
        }

        let lo = match range.effective_min() {
            (Some(v), side) => hist.fraction_below(v, side),
            (None, _) => 0.0,
        };
        let hi = match range.effective_max() {
            (Some(v), side) => hist.fraction_below(v, side),
            (None, _) => 1.0,
        };
        (hi - lo).max(SELECTIVITY_EPSILON)
    }

    fn estimate_records(&self, stats: &TableStats, cond: &IndexRangeCond) -> u64 {
        let valid_ranges = cond.get_valid_ranges(true);
        let selectivity: f64 = valid_ranges
            .iter()
            .map(|r| self.range_selectivity(stats, r))
            .product();
        let estimate = (stats.records as f64 * selectivity).round();
        estimate.max(1.0) as u64
    }
}

impl EstimatorStrategy for InnoDbLikeEstimator {
    fn scan_time(&self, stats: &TableStats) -> f64 {
        stats.records as f64 / 20.0 + 10.0
    }

    fn memory_buffer_size(&self, _stats: &TableStats) -> i64 {
        -1
    }

    fn records_in_range(&self, stats: &TableStats, cond: &IndexRangeCond) -> u64 {
        self.estimate_records(stats, cond)
    }

    fn cardinality(&self, stats: &TableStats, cond: &IndexRangeCond) -> u64 {
        self.estimate_records(stats, cond)
    }

    fn ndv(&self, stats: &TableStats, index: &str, prefix_cols: &[&str]) -> u64 {
        stats.get_ndv_mulcol(index, prefix_cols)
    }

    fn info_low(&self, stats: &TableStats, indexes: &[Index]) -> HashMap<String, String> {
        let mut data = HashMap::new();
        data.insert("stat_n_rows".to_string(), stats.records.to_string());
        data.insert(
            "stat_clustered_index_size".to_string(),
            stats.clustered_index_size.to_string(),
        );
        data.insert(
            "stat_sum_of_other_index_sizes".to_string(),
            stats.sum_of_other_index_sizes.to_string(),
        );
        data.insert("data_file_length".to_string(), stats.data_file_length.to_string());
        data.insert("index_file_length".to_string(), stats.index_file_length.to_string());
        data.insert("data_free_length".to_string(), stats.data_free_length.to_string());

        for index in indexes {
            let pct_cached = stats.get_pct_cached(&index.name);
            data.insert(format!("pct_cached #@# {}", index.name), pct_cached.to_string());

            let mut prefix = Vec::with_capacity(index.columns.len());
            for column in &index.columns {
                prefix.push(column.name.as_str());
                let ndv = stats.get_ndv_mulcol(&index.name, &prefix);
                let rec_per_key = if ndv == 0 {
                    stats.records as f64
                } else {
                    stats.records as f64 / ndv as f64
                };
                data.insert(
                    format!("rec_per_key #@# {} #@# {}", index.name, column.name),
                    rec_per_key.to_string(),
                );
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::histogram::{HistogramBucket, HistogramType, Side};
    use crate::models::range::RangeCond;
    use std::collections::HashMap as Map;

    fn s1_table_stats() -> TableStats {
        let hist = HistogramStats {
            buckets: vec![
                HistogramBucket { min: Value::Int(1), max: Value::Int(3), cum_freq: 0.6, row_count: 60.0, size: 0 },
                HistogramBucket { min: Value::Int(4), max: Value::Int(4), cum_freq: 0.8, row_count: 20.0, size: 0 },
                HistogramBucket { min: Value::Int(5), max: Value::Int(6), cum_freq: 1.0, row_count: 20.0, size: 0 },
            ],
            data_type: "int".to_string(),
            histogram_type: HistogramType::EquiHeight,
            null_values: 0.0,
            sampling_rate: 1.0,
            number_of_buckets_specified: 3,
        };
        let mut col_hists = Map::new();
        col_hists.insert("i_im_id".to_string(), hist);
        TableStats {
            db: "d".to_string(),
            name: "t".to_string(),
            records: 100,
            deleted: 0,
            clustered_index_size: 0,
            sum_of_other_index_sizes: 0,
            data_file_length: 0,
            index_file_length: 0,
            data_free_length: 0,
            avg_row_length: 0,
            pct_cached: Map::new(),
            ndvs_single: Map::new(),
            ndvs_mulcol: Map::new(),
            col_hists,
            sample_file_info: None,
            gt_return: None,
            columns: vec![],
            indexes: vec![],
            default_pct_cached: 0.0,
        }
    }

    #[test]
    fn scenario_s1_equality() {
        let stats = s1_table_stats();
        let cond = IndexRangeCond {
            index_name: "idx".to_string(),
            ranges: vec![RangeCond::construct_eq("i_im_id", "int", Value::Int(3))],
        };
        let estimator = InnoDbLikeEstimator;
        // bucket [1,3] holds 60 of the table's 100 rows spread evenly over 3 distinct values,
        // so `I_IM_ID = 3` gets a third of that bucket's share: 100 * (1/3 * 0.6) = 20.
        assert_eq!(estimator.records_in_range(&stats, &cond), 20);
    }

    #[test]
    fn scenario_s2_half_open_range() {
        let stats = s1_table_stats();
        let range = RangeCond::new(
            "i_im_id",
            "int",
            Some(Value::Int(3)),
            Some(crate::models::range::CmpOp::Gt),
            Some(Side::Right),
            None,
            None,
            None,
        )
        .unwrap();
        let cond = IndexRangeCond { index_name: "idx".to_string(), ranges: vec![range] };
        let estimator = InnoDbLikeEstimator;
        // `I_IM_ID > 3` excludes all of bucket [1,3] (cum_freq 0.6), leaving the other 40 rows.
        assert_eq!(estimator.records_in_range(&stats, &cond), 40);
    }

    #[test]
    fn full_range_returns_all_records() {
        let stats = s1_table_stats();
        let range = RangeCond::new(
            "i_im_id",
            "int",
            Some(Value::Int(1)),
            Some(crate::models::range::CmpOp::Gte),
            Some(Side::Left),
            Some(Value::Int(6)),
            Some(crate::models::range::CmpOp::Lte),
            Some(Side::Right),
        )
        .unwrap();
        let cond = IndexRangeCond { index_name: "idx".to_string(), ranges: vec![range] };
        let estimator = InnoDbLikeEstimator;
        let estimate = estimator.records_in_range(&stats, &cond);
        assert!((estimate as i64 - 100).abs() <= 1);
    }
}
