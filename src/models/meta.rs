//! Schema and table-level statistics (component C4): the `Column`/`IndexColumn`/`Index`
//! hierarchy and the `TableStats` aggregate that estimators read from. Mirrors the shape of
//! the upstream metadata model, minus the back-pointer cycle: an `IndexColumn` carries its
//! owning `(db, table)` pair instead of a live reference, per the cyclic-reference note in
//! §9 of the design notes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::histogram::HistogramStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexType {
    Primary,
    Unique,
    Normal,
    #[serde(rename = "FOREIGN_KEY")]
    ForeignKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collation {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub table: String,
    pub db: String,
    pub ordinal: u32,
    pub is_nullable: bool,
    pub data_type: String,
    pub column_type: String,
    pub key_role: Option<String>,
    pub is_pk: bool,
    pub auto_increment: bool,
    #[serde(default)]
    pub enum_candidates: Option<Vec<String>>,
}

impl Column {
    /// Case-insensitive identity comparison, matching the Python model's `__eq__`.
    pub fn same_as(&self, other: &Column) -> bool {
        self.db.eq_ignore_ascii_case(&other.db)
            && self.table.eq_ignore_ascii_case(&other.table)
            && self.name.eq_ignore_ascii_case(&other.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexColumn {
    /// Empty for a pure expression index column; the decoder fills this in from `expression`.
    pub name: String,
    pub collation: Collation,
    /// Prefix length, 0 meaning "no prefix truncation".
    pub sub_part: u32,
    pub expression: Option<String>,
    pub db: String,
    pub table: String,
}

impl IndexColumn {
    pub fn is_desc(&self) -> bool {
        self.collation == Collation::Desc
    }

    /// Builds an `IndexColumn` from a `Column`, applying the TEXT/LONGTEXT default-prefix
    /// special case documented in §3.
    pub fn from_column(column: &Column, collation: Collation, sub_part: u32, expression: Option<String>) -> Self {
        let resolved_sub_part = if sub_part == 0
            && matches!(column.data_type.to_uppercase().as_str(), "TEXT" | "LONGTEXT")
        {
            255
        } else {
            sub_part
        };
        IndexColumn {
            name: column.name.clone(),
            collation,
            sub_part: resolved_sub_part,
            expression,
            db: column.db.clone(),
            table: column.table.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
    pub columns: Vec<IndexColumn>,
    pub is_unique: bool,
    pub is_visible: bool,
    pub db: String,
    pub table: String,
}

impl Index {
    /// Names of the index's key columns, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleFileInfo {
    pub path: String,
    pub row_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GtRangeEntry {
    pub range_str: String,
    pub rows: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GtTable {
    pub idx_gt_pair: HashMap<String, Vec<GtRangeEntry>>,
    /// Recorded `(request fingerprint -> response data)` pairs enabling bit-exact replay of
    /// arbitrary `ask_videx` requests, per §4.6.
    #[serde(default)]
    pub req_resp: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStats {
    pub db: String,
    pub name: String,
    pub records: u64,
    pub deleted: u64,
    pub clustered_index_size: u64,
    pub sum_of_other_index_sizes: u64,
    pub data_file_length: u64,
    pub index_file_length: u64,
    pub data_free_length: u64,
    pub avg_row_length: u64,
    #[serde(default)]
    pub pct_cached: HashMap<String, f64>,
    #[serde(default)]
    pub ndvs_single: HashMap<String, u64>,
    #[serde(default)]
    pub ndvs_mulcol: HashMap<String, HashMap<String, u64>>,
    #[serde(default)]
    pub col_hists: HashMap<String, HistogramStats>,
    #[serde(default)]
    pub sample_file_info: Option<SampleFileInfo>,
    #[serde(default)]
    pub gt_return: Option<GtTable>,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    /// Default used by `get_pct_cached` when no measured value was recorded for an index.
    #[serde(default)]
    pub default_pct_cached: f64,
}

impl TableStats {
    pub fn get_col_hist(&self, col: &str) -> Option<&HistogramStats> {
        self.col_hists
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(col))
            .map(|(_, v)| v)
    }

    pub fn get_ndv_single(&self, col: &str) -> Option<u64> {
        self.ndvs_single
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(col))
            .map(|(_, v)| *v)
    }

    /// `get_ndv_mulcol(index, prefix_cols)`, per §4.4: exact recorded value if present,
    /// otherwise the independence estimate bounded by `records`.
    pub fn get_ndv_mulcol(&self, index: &str, prefix_cols: &[&str]) -> u64 {
        if prefix_cols.is_empty() {
            return 1;
        }
        let prefix_key = prefix_cols.join(",").to_lowercase();
        if let Some(measured) = self.ndvs_mulcol.iter().find(|(k, _)| k.eq_ignore_ascii_case(index)) {
            if let Some((_, ndv)) = measured.1.iter().find(|(k, _)| k.to_lowercase() == prefix_key) {
                return *ndv;
            }
        }
        let product: u128 = prefix_cols
            .iter()
            .map(|c| self.get_ndv_single(c).unwrap_or(1) as u128)
            .product();
        (product.min(self.records as u128)) as u64
    }

    pub fn get_pct_cached(&self, index: &str) -> f64 {
        self.pct_cached
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(index))
            .map(|(_, v)| *v)
            .unwrap_or(self.default_pct_cached)
    }

    pub fn find_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|idx| idx.name.eq_ignore_ascii_case(name))
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// A task's complete metadata for one videx database: every table's statistics keyed by
/// lowercased table name, per the `TaskMeta` key convention in §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VidexDbMeta {
    pub tables: HashMap<String, TableStats>,
}

impl VidexDbMeta {
    pub fn get_table(&self, table: &str) -> Option<&TableStats> {
        self.tables.get(&table.to_lowercase())
    }

    pub fn insert_table(&mut self, mut stats: TableStats) {
        stats.name = stats.name.to_lowercase();
        for index in &mut stats.indexes {
            if index.db.is_empty() {
                index.db = stats.db.clone();
            }
            if index.table.is_empty() {
                index.table = stats.name.clone();
            }
            for column in &mut index.columns {
                if column.db.is_empty() {
                    column.db = stats.db.clone();
                }
                if column.table.is_empty() {
                    column.table = stats.name.clone();
                }
            }
        }
        self.tables.insert(stats.name.clone(), stats);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMeta {
    pub task_id: String,
    pub dbs: HashMap<String, VidexDbMeta>,
}

impl TaskMeta {
    pub fn get_table(&self, db: &str, table: &str) -> Option<&TableStats> {
        self.dbs.get(&db.to_lowercase()).and_then(|d| d.get_table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_column(name: &str, data_type: &str) -> Column {
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
    fn text_columns_default_sub_part_to_255() {
        let col = sample_column("body", "TEXT");
        let ic = IndexColumn::from_column(&col, Collation::Asc, 0, None);
        assert_eq!(ic.sub_part, 255);
    }

    #[test]
    fn explicit_sub_part_is_preserved() {
        let col = sample_column("body", "TEXT");
        let ic = IndexColumn::from_column(&col, Collation::Asc, 20, None);
        assert_eq!(ic.sub_part, 20);
    }

    #[test]
    fn ndv_mulcol_falls_back_to_independence_estimate() {
        let mut stats = empty_table_stats();
        stats.records = 1000;
        stats.ndvs_single.insert("a".to_string(), 10);
        stats.ndvs_single.insert("b".to_string(), 50);
        assert_eq!(stats.get_ndv_mulcol("idx", &["a", "b"]), 500);
    }

    #[test]
    fn ndv_mulcol_is_bounded_by_records() {
        let mut stats = empty_table_stats();
        stats.records = 100;
        stats.ndvs_single.insert("a".to_string(), 10);
        stats.ndvs_single.insert("b".to_string(), 50);
        assert_eq!(stats.get_ndv_mulcol("idx", &["a", "b"]), 100);
    }

    fn empty_table_stats() -> TableStats {
        TableStats {
            db: "d".to_string(),
            name: "t".to_string(),
            records: 0,
            deleted: 0,
            clustered_index_size: 0,
            sum_of_other_index_sizes: 0,
            data_file_length: 0,
            index_file_length: 0,
            data_free_length: 0,
            avg_row_length: 0,
            pct_cached: HashMap::new(),
            ndvs_single: HashMap::new(),
            ndvs_mulcol: HashMap::new(),
            col_hists: HashMap::new(),
            sample_file_info: None,
            gt_return: None,
            columns: vec![],
            indexes: vec![],
            default_pct_cached: 0.0,
        }
    }
}
