//! Metadata construction (component C9): merges independently-gathered stats, histograms,
//! and NDV tables into validated `TableStats`, and fills in any size fields the caller left
//! unset using the row-width/index-length heuristics from the upstream stats estimator.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;

use crate::error::{EstimatorError, Result};
use crate::models::histogram::HistogramStats;
use crate::models::meta::{Column, GtRangeEntry, GtTable, Index, IndexType, TableStats, TaskMeta, VidexDbMeta};
use crate::services::task_registry::validate_identifier;

const PRIMARY_KEY_LENGTH: f64 = 8.0;
const INDEX_ENTRY_OVERHEAD: f64 = 10.0;
const FILL_FACTOR_MULTIPLIER: f64 = 1.2;
const INDEX_PAGE_SIZE: f64 = 16.0 * 1024.0;
const PAGE_FILL_RATIO: f64 = 0.7;
const POINTER_SIZE: f64 = 6.0;
const ROW_OVERHEAD: f64 = 10.0;
const DATA_FREE_COEFFICIENT: f64 = 0.1;

/// `estimate_column_length(col_type)`: the per-type constant table driving row-width estimates.
pub fn estimate_column_length(col_type: &str) -> f64 {
    let (base, params) = split_type(col_type);
    match base.as_str() {
        "int" | "integer" => 4.0,
        "bigint" => 8.0,
        "smallint" => 2.0,
        "tinyint" => 1.0,
        "mediumint" => 3.0,
        "float" => 4.0,
        "double" => 8.0,
        "decimal" => 8.0,
        "timestamp" => 4.0,
        "date" => 3.0,
        "datetime" => 8.0,
        "char" => params.and_then(|p| first_param(&p)).unwrap_or(1.0),
        "varchar" => params.and_then(|p| first_param(&p)).map(|n| n / 2.0).unwrap_or(1.0),
        "text" | "blob" => 100.0,
        _ => 50.0,
    }
}

/// `estimate_index_key_length(col_type)`: same table but variable-length types cap at a
/// 255-byte effective prefix the way a real key layout would.
pub fn estimate_index_key_length(col_type: &str) -> f64 {
    let (base, params) = split_type(col_type);
    match base.as_str() {
        "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "float" | "double"
        | "decimal" | "timestamp" | "date" | "datetime" | "char" => estimate_column_length(col_type),
        "varchar" => params
            .and_then(|p| first_param(&p))
            .map(|n| n.min(255.0) / 2.0)
            .unwrap_or(1.0),
        "text" | "blob" => 255.0 / 2.0,
        _ => 50.0,
    }
}

fn split_type(col_type: &str) -> (String, Option<String>) {
    let re = Regex::new(r"^([a-z]+)(\((.+?)\))?").unwrap();
    let lowered = col_type.to_lowercase();
    let trimmed = lowered.trim();
    let Some(caps) = re.captures(trimmed) else {
        return (String::new(), None);
    };
    let base = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
    let params = caps.get(3).map(|m| m.as_str().to_string());
    (base, params)
}

fn first_param(params: &str) -> Option<f64> {
    params.split(',').next()?.trim().parse::<f64>().ok()
}

/// `estimate_total_index_length`, per §4.9: weights a direct row-count estimate against a
/// page-based estimate for every index, summed across all indexes.
fn estimate_total_index_length(table_rows: f64, indexes: &[Index], columns: &[Column]) -> f64 {
    let mut total = 0.0;
    for index in indexes {
        let mut key_length = 0.0;
        for index_col in &index.columns {
            let found = columns.iter().find(|c| c.name.eq_ignore_ascii_case(&index_col.name));
            key_length += match found {
                Some(col) => estimate_index_key_length(&col.column_type),
                None => 50.0,
            };
        }

        let index_record_length = if index.index_type == IndexType::Primary {
            key_length + INDEX_ENTRY_OVERHEAD
        } else {
            key_length + PRIMARY_KEY_LENGTH + INDEX_ENTRY_OVERHEAD
        };

        let estimation_1 = table_rows * index_record_length * FILL_FACTOR_MULTIPLIER;

        let effective_record_size = index_record_length + POINTER_SIZE;
        let records_per_page = if effective_record_size > 0.0 {
            (INDEX_PAGE_SIZE * PAGE_FILL_RATIO) / effective_record_size
        } else {
            table_rows
        };
        let num_pages = if records_per_page > 0.0 { (table_rows / records_per_page).ceil() } else { 0.0 };
        let estimation_2 = num_pages * INDEX_PAGE_SIZE;

        total += 0.5 * estimation_1 + 0.5 * estimation_2;
    }
    total
}

/// Size fields filled in for a table whose caller didn't supply them, per §4.9.
pub struct EstimatedSizes {
    pub avg_row_length: u64,
    pub total_estimated_index_length: u64,
    pub data_file_length: u64,
    pub data_free_length: u64,
}

/// `estimate_data_length`, per §4.9: row width from column types, index length from key
/// layout, data length as a 10/90 blend of a row-count estimate and a size-remainder estimate.
pub fn estimate_sizes(table_rows: u64, declared_table_size: u64, columns: &[Column], indexes: &[Index]) -> EstimatedSizes {
    let table_rows_f = table_rows as f64;
    let table_size_f = declared_table_size as f64;

    let base_row_length: f64 = columns.iter().map(|c| estimate_column_length(&c.column_type)).sum();
    let avg_row_length = (base_row_length + ROW_OVERHEAD).max(1.0);

    let estimated_data_length_by_rows = table_rows_f * avg_row_length;

    let mut total_estimated_index_length = estimate_total_index_length(table_rows_f, indexes, columns);
    if total_estimated_index_length <= 0.0 {
        total_estimated_index_length = (table_size_f * 0.1).max(1.0);
    }

    let mut data_free_length = 0.0;
    let mut remaining = table_size_f - total_estimated_index_length - data_free_length;
    if remaining <= 0.0 {
        total_estimated_index_length = table_size_f * 0.2;
        data_free_length = table_size_f * DATA_FREE_COEFFICIENT;
        remaining = table_size_f - total_estimated_index_length - data_free_length;
    }
    let estimated_data_length_by_table_size = remaining;

    let weight_row_avg = 0.1;
    let mut combined =
        weight_row_avg * estimated_data_length_by_rows + (1.0 - weight_row_avg) * estimated_data_length_by_table_size;
    if combined <= 0.0 {
        combined = estimated_data_length_by_table_size;
    }

    EstimatedSizes {
        avg_row_length: avg_row_length.round() as u64,
        total_estimated_index_length: total_estimated_index_length.round() as u64,
        data_file_length: combined.max(0.0).round() as u64,
        data_free_length: data_free_length.max(0.0).round() as u64,
    }
}

/// Inputs for constructing one table's statistics, mirroring the four independently-gathered
/// maps described in §4.7's ingestion shapes.
pub struct TableStatsInput {
    pub db: String,
    pub name: String,
    pub records: u64,
    pub deleted: u64,
    pub declared_table_size: Option<u64>,
    pub avg_row_length: Option<u64>,
    pub index_file_length: Option<u64>,
    pub data_file_length: Option<u64>,
    pub data_free_length: Option<u64>,
    pub clustered_index_size: u64,
    pub sum_of_other_index_sizes: u64,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub col_hists: HashMap<String, HistogramStats>,
    pub ndvs_single: HashMap<String, u64>,
    pub ndvs_mulcol: HashMap<String, HashMap<String, u64>>,
    pub pct_cached: HashMap<String, f64>,
    pub default_pct_cached: f64,
    pub gt_rir: Option<HashMap<String, Vec<GtRangeEntry>>>,
    pub gt_req_resp: Option<HashMap<String, HashMap<String, String>>>,
}

/// `construct_task_meta`'s per-table step: validates index references, backfills size fields,
/// and produces one `TableStats`.
pub fn construct_table_stats(input: TableStatsInput) -> Result<TableStats> {
    if input.records == 0 && input.declared_table_size.is_none() {
        return Err(EstimatorError::ValidationError(format!(
            "table {}.{} has no rows declared",
            input.db, input.name
        )));
    }

    for index in &input.indexes {
        for index_col in &index.columns {
            if index_col.expression.is_none()
                && !input.columns.iter().any(|c| c.name.eq_ignore_ascii_case(&index_col.name))
            {
                return Err(EstimatorError::ValidationError(format!(
                    "index {} references unknown column {}",
                    index.name, index_col.name
                )));
            }
        }
    }

    let declared_table_size = input.declared_table_size.unwrap_or(0);
    let estimated = estimate_sizes(input.records, declared_table_size, &input.columns, &input.indexes);

    let gt_return = match (input.gt_rir, input.gt_req_resp) {
        (None, None) => None,
        (rir, req_resp) => Some(GtTable {
            idx_gt_pair: rir.unwrap_or_default(),
            req_resp: req_resp.unwrap_or_default(),
        }),
    };

    Ok(TableStats {
        db: input.db,
        name: input.name.to_lowercase(),
        records: input.records,
        deleted: input.deleted,
        clustered_index_size: input.clustered_index_size,
        sum_of_other_index_sizes: input.sum_of_other_index_sizes,
        data_file_length: input.data_file_length.unwrap_or(estimated.data_file_length),
        index_file_length: input.index_file_length.unwrap_or(estimated.total_estimated_index_length),
        data_free_length: input.data_free_length.unwrap_or(estimated.data_free_length),
        avg_row_length: input.avg_row_length.unwrap_or(estimated.avg_row_length),
        pct_cached: input.pct_cached,
        ndvs_single: input.ndvs_single,
        ndvs_mulcol: input.ndvs_mulcol,
        col_hists: input.col_hists,
        sample_file_info: None,
        gt_return,
        columns: input.columns,
        indexes: input.indexes,
        default_pct_cached: input.default_pct_cached,
    })
}

/// Parses the referenced column name out of a functional-index expression, recognizing
/// `cast(json_extract(col, '$.path') as <type> array)` forms, per §4.9.
pub fn parse_functional_index_column_name(expression: &str) -> Option<String> {
    let re = Regex::new(r"json_extract\(\s*`?(\w+)`?\s*,").ok()?;
    re.captures(expression)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// One table's raw ingest fields, as they arrive inside the four-maps shape described in
/// §4.7 and the metadata file format in §6 (`stats_dict` entry plus its siblings).
#[derive(Debug, Deserialize)]
pub struct TableStatsDoc {
    pub rows: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub table_size: Option<u64>,
    #[serde(default)]
    pub avg_row_length: Option<u64>,
    #[serde(default)]
    pub index_file_length: Option<u64>,
    #[serde(default)]
    pub data_file_length: Option<u64>,
    #[serde(default)]
    pub data_free_length: Option<u64>,
    #[serde(default)]
    pub clustered_index_size: u64,
    #[serde(default)]
    pub sum_of_other_index_sizes: u64,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub pct_cached: HashMap<String, f64>,
    #[serde(default)]
    pub default_pct_cached: f64,
}

/// The single-document ingest shape: `{task_id, videx_db, stats_dict, hist_dict,
/// ndv_single_dict, ndv_mulcol_dict, gt_rec_in_ranges, gt_req_resp}`, matching the metadata
/// file format in §6 so the same document can come from `POST /create_task_meta` or from a
/// saved `metadata_<...>.json` file.
#[derive(Debug, Deserialize)]
pub struct TaskDocument {
    pub task_id: String,
    pub videx_db: String,
    pub stats_dict: HashMap<String, TableStatsDoc>,
    #[serde(default)]
    pub hist_dict: HashMap<String, HashMap<String, HistogramStats>>,
    #[serde(default)]
    pub ndv_single_dict: HashMap<String, HashMap<String, u64>>,
    #[serde(default)]
    pub ndv_mulcol_dict: HashMap<String, HashMap<String, HashMap<String, u64>>>,
    #[serde(default)]
    pub gt_rec_in_ranges: HashMap<String, HashMap<String, Vec<GtRangeEntry>>>,
    #[serde(default)]
    pub gt_req_resp: HashMap<String, HashMap<String, HashMap<String, String>>>,
}

/// `construct_task_meta`, per §4.9: merges the four independently-gathered maps (plus
/// optional ground truth) into one `TaskMeta`, validating `task_id`/`videx_db` and every
/// table along the way.
pub fn construct_task_meta(doc: TaskDocument) -> Result<TaskMeta> {
    validate_identifier("task_id", &doc.task_id)?;
    validate_identifier("videx_db", &doc.videx_db)?;

    let mut vdb = VidexDbMeta::default();
    for (table_name, table_doc) in doc.stats_dict {
        let key = table_name.to_lowercase();
        let input = TableStatsInput {
            db: doc.videx_db.clone(),
            name: table_name.clone(),
            records: table_doc.rows,
            deleted: table_doc.deleted,
            declared_table_size: table_doc.table_size,
            avg_row_length: table_doc.avg_row_length,
            index_file_length: table_doc.index_file_length,
            data_file_length: table_doc.data_file_length,
            data_free_length: table_doc.data_free_length,
            clustered_index_size: table_doc.clustered_index_size,
            sum_of_other_index_sizes: table_doc.sum_of_other_index_sizes,
            columns: table_doc.columns,
            indexes: table_doc.indexes,
            col_hists: doc.hist_dict.get(&key).cloned().unwrap_or_default(),
            ndvs_single: doc.ndv_single_dict.get(&key).cloned().unwrap_or_default(),
            ndvs_mulcol: doc.ndv_mulcol_dict.get(&key).cloned().unwrap_or_default(),
            pct_cached: table_doc.pct_cached,
            default_pct_cached: table_doc.default_pct_cached,
            gt_rir: doc.gt_rec_in_ranges.get(&key).cloned(),
            gt_req_resp: doc.gt_req_resp.get(&key).cloned(),
        };
        let stats = construct_table_stats(input)?;
        vdb.insert_table(stats);
    }

    let mut meta = TaskMeta { task_id: doc.task_id, dbs: HashMap::new() };
    meta.dbs.insert(doc.videx_db.to_lowercase(), vdb);
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::meta::{Collation, IndexColumn};

    fn column(name: &str, data_type: &str) -> Column {
        Column {
            name: name.to_string(),
            table: "t".to_string(),
            db: "d".to_string(),
            ordinal: 1,
            is_nullable: true,
            data_type: data_type.to_string(),
            column_type: data_type.to_string(),
            key_role: None,
            is_pk: false,
            auto_increment: false,
            enum_candidates: None,
        }
    }

    #[test]
    fn column_length_table_matches_known_types() {
        assert_eq!(estimate_column_length("int"), 4.0);
        assert_eq!(estimate_column_length("bigint"), 8.0);
        assert_eq!(estimate_column_length("varchar(100)"), 50.0);
        assert_eq!(estimate_column_length("text"), 100.0);
        assert_eq!(estimate_column_length("mystery_type"), 50.0);
    }

    #[test]
    fn index_key_length_caps_varchar_at_255() {
        assert_eq!(estimate_index_key_length("varchar(1000)"), 127.5);
        assert_eq!(estimate_index_key_length("varchar(100)"), 50.0);
    }

    #[test]
    fn estimate_sizes_never_produces_zero_index_length() {
        let columns = vec![column("id", "bigint")];
        let sizes = estimate_sizes(0, 1000, &columns, &[]);
        assert!(sizes.total_estimated_index_length >= 1);
    }

    #[test]
    fn construct_table_stats_rejects_dangling_index_column() {
        let index = Index {
            name: "idx".to_string(),
            index_type: IndexType::Normal,
            columns: vec![IndexColumn {
                name: "missing".to_string(),
                collation: Collation::Asc,
                sub_part: 0,
                expression: None,
                db: String::new(),
                table: String::new(),
            }],
            is_unique: false,
            is_visible: true,
            db: "d".to_string(),
            table: "t".to_string(),
        };
        let input = TableStatsInput {
            db: "d".to_string(),
            name: "t".to_string(),
            records: 100,
            deleted: 0,
            declared_table_size: Some(1000),
            avg_row_length: None,
            index_file_length: None,
            data_file_length: None,
            data_free_length: None,
            clustered_index_size: 0,
            sum_of_other_index_sizes: 0,
            columns: vec![column("id", "bigint")],
            indexes: vec![index],
            col_hists: HashMap::new(),
            ndvs_single: HashMap::new(),
            ndvs_mulcol: HashMap::new(),
            pct_cached: HashMap::new(),
            default_pct_cached: 0.0,
            gt_rir: None,
            gt_req_resp: None,
        };
        assert!(construct_table_stats(input).is_err());
    }

    #[test]
    fn construct_table_stats_backfills_sizes() {
        let input = TableStatsInput {
            db: "d".to_string(),
            name: "T".to_string(),
            records: 1000,
            deleted: 0,
            declared_table_size: Some(100_000),
            avg_row_length: None,
            index_file_length: None,
            data_file_length: None,
            data_free_length: None,
            clustered_index_size: 0,
            sum_of_other_index_sizes: 0,
            columns: vec![column("id", "bigint"), column("name", "varchar(100)")],
            indexes: vec![],
            col_hists: HashMap::new(),
            ndvs_single: HashMap::new(),
            ndvs_mulcol: HashMap::new(),
            pct_cached: HashMap::new(),
            default_pct_cached: 0.0,
            gt_rir: None,
            gt_req_resp: None,
        };
        let stats = construct_table_stats(input).unwrap();
        assert_eq!(stats.name, "t");
        assert!(stats.avg_row_length > 0);
        assert!(stats.index_file_length > 0);
    }

    #[test]
    fn parses_functional_index_column() {
        let expr = "cast(json_extract(`payload`, '$.id') as unsigned array)";
        assert_eq!(parse_functional_index_column_name(expr).as_deref(), Some("payload"));
    }

    #[test]
    fn construct_task_meta_merges_sibling_maps() {
        let json = r#"{
            "task_id": "t1",
            "videx_db": "mydb",
            "stats_dict": {
                "orders": { "rows": 100, "table_size": 10000, "columns": [], "indexes": [] }
            },
            "ndv_single_dict": {
                "orders": { "id": 100 }
            }
        }"#;
        let doc: TaskDocument = serde_json::from_str(json).unwrap();
        let meta = construct_task_meta(doc).unwrap();
        let stats = meta.get_table("mydb", "orders").unwrap();
        assert_eq!(stats.records, 100);
        assert_eq!(stats.get_ndv_single("id"), Some(100));
    }

    #[test]
    fn construct_task_meta_rejects_bad_task_id() {
        let json = r#"{
            "task_id": "not a valid id",
            "videx_db": "mydb",
            "stats_dict": {}
        }"#;
        let doc: TaskDocument = serde_json::from_str(json).unwrap();
        assert!(construct_task_meta(doc).is_err());
    }
}
