//! Per-task metadata isolation (component C7): `task_id -> {videx_db -> {table -> TableStats}}`
//! with atomic pointer-swap replace semantics so in-flight readers never observe a half-written
//! task.

use std::io::Read;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;

use crate::error::{EstimatorError, Result};
use crate::models::meta::TaskMeta;

static IDENTIFIER_RE: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Validates a `task_id`/`videx_db` identifier against `^[A-Za-z0-9_]+$`, per the decoder
/// hardening decision recorded alongside this service's design notes.
pub fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(value) {
        Ok(())
    } else {
        Err(EstimatorError::ValidationError(format!(
            "{field} {value:?} is not a valid identifier (expected [A-Za-z0-9_]+)"
        )))
    }
}

/// Thread-safe store of tasks, keyed by `task_id`. Each task is held behind an `Arc` so that a
/// reader's snapshot survives a concurrent `replace`/`drop` undisturbed.
pub struct TaskRegistry {
    tasks: RwLock<std::collections::HashMap<String, Arc<TaskMeta>>>,
    max_decompressed_payload_bytes: u64,
}

impl TaskRegistry {
    pub fn new(max_decompressed_payload_bytes: u64) -> Self {
        TaskRegistry {
            tasks: RwLock::new(std::collections::HashMap::new()),
            max_decompressed_payload_bytes,
        }
    }

    /// Decompresses `body` if it looks gzip-encoded (magic bytes `1f 8b`), otherwise returns it
    /// unchanged. Enforces the configured decompressed-size cap.
    pub fn decode_payload(&self, body: &[u8]) -> Result<Vec<u8>> {
        let decompressed = if body.starts_with(&[0x1f, 0x8b]) {
            let mut decoder = flate2::read::GzDecoder::new(body);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| EstimatorError::ValidationError(format!("gzip decode failed: {e}")))?;
            out
        } else {
            body.to_vec()
        };

        if decompressed.len() as u64 > self.max_decompressed_payload_bytes {
            return Err(EstimatorError::ValidationError(format!(
                "decompressed payload ({} bytes) exceeds cap ({} bytes)",
                decompressed.len(),
                self.max_decompressed_payload_bytes
            )));
        }
        Ok(decompressed)
    }

    /// Replaces any existing entry for `meta.task_id` atomically: readers holding the old `Arc`
    /// keep seeing a consistent snapshot until they drop it.
    pub fn add_task_meta(&self, meta: TaskMeta) -> Result<()> {
        validate_identifier("task_id", &meta.task_id)?;
        for db_name in meta.dbs.keys() {
            validate_identifier("videx_db", db_name)?;
        }
        self.tasks.write().insert(meta.task_id.clone(), Arc::new(meta));
        Ok(())
    }

    pub fn lookup(&self, task_id: &str, db: &str, table: &str) -> Option<Arc<TaskMeta>> {
        let guard = self.tasks.read();
        let meta = guard.get(task_id)?;
        meta.get_table(db, table)?;
        Some(Arc::clone(meta))
    }

    pub fn drop_task(&self, task_id: &str) -> bool {
        self.tasks.write().remove(task_id).is_some()
    }

    /// A snapshot suitable for the visualization endpoint: task ids and, per task, the
    /// `(db, table)` pairs registered.
    pub fn snapshot(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.tasks
            .read()
            .iter()
            .map(|(task_id, meta)| {
                let tables = meta
                    .dbs
                    .iter()
                    .flat_map(|(db, vdb)| vdb.tables.keys().map(move |t| (db.clone(), t.clone())))
                    .collect();
                (task_id.clone(), tables)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::meta::VidexDbMeta;

    fn sample_meta(task_id: &str) -> TaskMeta {
        TaskMeta { task_id: task_id.to_string(), dbs: std::collections::HashMap::new() }
    }

    #[test]
    fn rejects_non_identifier_task_id() {
        let registry = TaskRegistry::new(1024);
        let meta = sample_meta("task/../etc");
        assert!(registry.add_task_meta(meta).is_err());
    }

    #[test]
    fn replace_is_visible_to_new_lookups() {
        let registry = TaskRegistry::new(1024 * 1024);
        let mut meta = sample_meta("t1");
        meta.dbs.insert("mydb".to_string(), VidexDbMeta::default());
        registry.add_task_meta(meta).unwrap();
        assert!(registry.lookup("t1", "mydb", "missing_table").is_none());

        let mut meta2 = sample_meta("t1");
        let mut vdb = VidexDbMeta::default();
        vdb.insert_table(crate::models::meta::TableStats {
            db: "mydb".to_string(),
            name: "orders".to_string(),
            records: 10,
            deleted: 0,
            clustered_index_size: 0,
            sum_of_other_index_sizes: 0,
            data_file_length: 0,
            index_file_length: 0,
            data_free_length: 0,
            avg_row_length: 0,
            pct_cached: std::collections::HashMap::new(),
            ndvs_single: std::collections::HashMap::new(),
            ndvs_mulcol: std::collections::HashMap::new(),
            col_hists: std::collections::HashMap::new(),
            sample_file_info: None,
            gt_return: None,
            columns: vec![],
            indexes: vec![],
            default_pct_cached: 0.0,
        });
        meta2.dbs.insert("mydb".to_string(), vdb);
        registry.add_task_meta(meta2).unwrap();
        assert!(registry.lookup("t1", "mydb", "orders").is_some());
    }

    #[test]
    fn drop_removes_task() {
        let registry = TaskRegistry::new(1024);
        registry.add_task_meta(sample_meta("t2")).unwrap();
        assert!(registry.drop_task("t2"));
        assert!(!registry.drop_task("t2"));
    }

    #[test]
    fn rejects_oversized_payload() {
        let registry = TaskRegistry::new(4);
        let body = b"hello world".to_vec();
        assert!(registry.decode_payload(&body).is_err());
    }

    #[test]
    fn passes_through_plain_json_under_cap() {
        let registry = TaskRegistry::new(1024);
        let body = b"{}".to_vec();
        assert_eq!(registry.decode_payload(&body).unwrap(), body);
    }
}
