//! The range decoder (component C3): turns the optimizer's `(min_key, max_key)` pair into a
//! typed `IndexRangeCond`, honoring ascending/descending collation per §4.3's operator table.
//!
//! The wire operator only ever arrives as one of `=`, `>`, `<` in practice (MySQL's handler
//! API maps `HA_READ_KEY_EXACT`/`HA_READ_AFTER_KEY`/`HA_READ_BEFORE_KEY` to exactly those
//! three); `>=`/`<=` are accepted defensively and folded onto the nearest documented row.

use tracing::{error, warn};

use crate::error::Result;
use crate::models::histogram::Side;
use crate::models::meta::Index;
use crate::models::range::{CmpOp, IndexRangeCond, RangeCond};
use crate::models::request::KeyBound;
use crate::models::value;

#[derive(Debug, Clone, Copy)]
enum Role {
    Min,
    Max,
}

fn translate(raw_op: &str, role: Role, descending: bool) -> (CmpOp, Side) {
    match role {
        Role::Min => match raw_op {
            "=" => {
                if descending {
                    (CmpOp::Lte, Side::Right)
                } else {
                    (CmpOp::Gte, Side::Left)
                }
            }
            ">" | ">=" => {
                if descending {
                    (CmpOp::Lt, Side::Left)
                } else {
                    (CmpOp::Gt, Side::Right)
                }
            }
            other => {
                warn!("unrecognized min-role operator {other:?}, defaulting to >=");
                (CmpOp::Gte, Side::Left)
            }
        },
        Role::Max => match raw_op {
            ">" | ">=" => {
                if descending {
                    (CmpOp::Gte, Side::Left)
                } else {
                    (CmpOp::Lte, Side::Right)
                }
            }
            "<" | "<=" => {
                if descending {
                    (CmpOp::Gt, Side::Right)
                } else {
                    (CmpOp::Lt, Side::Left)
                }
            }
            other => {
                warn!("unrecognized max-role operator {other:?}, defaulting to <=");
                (CmpOp::Lte, Side::Right)
            }
        },
    }
}

/// Decodes one index's predicate from the optimizer's min/max key records.
///
/// `data_type_of` resolves a column name to its declared type; columns absent from the table
/// (shouldn't happen for a well-formed index) fall back to `"varchar"`.
pub fn decode_index_range_cond(
    min: Option<&KeyBound>,
    max: Option<&KeyBound>,
    index: &Index,
    data_type_of: impl Fn(&str) -> Option<String>,
) -> Result<IndexRangeCond> {
    let min_len = min.map(|k| k.bounds.len()).unwrap_or(0);
    let max_len = max.map(|k| k.bounds.len()).unwrap_or(0);
    if min_len.abs_diff(max_len) > 1 {
        error!(
            "min_key and max_key differ in length by more than one ({min_len} vs {max_len}) for index {}",
            index.name
        );
    }
    let n_col = min_len.max(max_len);

    let mut ranges = Vec::with_capacity(n_col);
    for i in 0..n_col {
        let min_bound = min.and_then(|k| k.bounds.get(i));
        let max_bound = max.and_then(|k| k.bounds.get(i));
        let col_name = min_bound
            .or(max_bound)
            .map(|b| b.column.clone())
            .unwrap_or_default();
        let data_type = data_type_of(&col_name).unwrap_or_else(|| "varchar".to_string());
        let descending = index
            .columns
            .get(i)
            .map(|c| c.is_desc())
            .unwrap_or(false);

        let min_value = match min_bound {
            Some(b) => Some(value::decode(&b.value, &data_type)?),
            None => None,
        };
        let max_value = match max_bound {
            Some(b) => Some(value::decode(&b.value, &data_type)?),
            None => None,
        };

        let same_value = match (&min_value, &max_value) {
            (Some(a), Some(b)) => a.compare(b).map(|o| o.is_eq()).unwrap_or(false),
            _ => false,
        };

        let range = if same_value {
            RangeCond::construct_eq(col_name, data_type, min_value.unwrap())
        } else {
            let from_min_key = min_value.map(|v| {
                let raw_op = min.and_then(|k| k.operator.as_deref()).unwrap_or("=");
                let (op, side) = translate(raw_op, Role::Min, descending);
                (v, op, side)
            });
            let from_max_key = max_value.map(|v| {
                let raw_op = max.and_then(|k| k.operator.as_deref()).unwrap_or("<");
                let (op, side) = translate(raw_op, Role::Max, descending);
                (v, op, side)
            });

            // A descending column flips which field the resulting operator belongs in: e.g. a
            // max_key's "<" becomes `Gt`, which is only valid as a min operator. Route by the
            // resulting operator's own role rather than the key it was translated from.
            let mut min_part = None;
            let mut max_part = None;
            for part in [from_min_key, from_max_key].into_iter().flatten() {
                let (_, op, _) = part;
                if op.is_min_valid() {
                    min_part = Some(part);
                } else {
                    max_part = Some(part);
                }
            }

            RangeCond::new(
                col_name,
                data_type,
                min_part.as_ref().map(|(v, _, _)| v.clone()),
                min_part.as_ref().map(|(_, op, _)| *op),
                min_part.as_ref().map(|(_, _, s)| *s),
                max_part.as_ref().map(|(v, _, _)| v.clone()),
                max_part.as_ref().map(|(_, op, _)| *op),
                max_part.as_ref().map(|(_, _, s)| *s),
            )?
        };
        ranges.push(range);
    }

    Ok(IndexRangeCond {
        index_name: index.name.clone(),
        ranges,
    })
}

/// Picks the index a request's `min_key`/`max_key` refer to, defaulting to the first index
/// whose name matches `key.index_name` when supplied, or the table's primary key otherwise.
pub fn resolve_index<'a>(indexes: &'a [Index], index_name: Option<&str>) -> Option<&'a Index> {
    if let Some(name) = index_name {
        if let Some(found) = indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name)) {
            return Some(found);
        }
    }
    indexes
        .iter()
        .find(|i| i.index_type == crate::models::meta::IndexType::Primary)
        .or_else(|| indexes.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::meta::{Collation, IndexColumn, IndexType};
    use crate::models::request::ColumnBound;

    fn index_column(name: &str, collation: Collation) -> IndexColumn {
        IndexColumn {
            name: name.to_string(),
            collation,
            sub_part: 0,
            expression: None,
            db: "d".to_string(),
            table: "t".to_string(),
        }
    }

    fn bound(col: &str, value: &str) -> ColumnBound {
        ColumnBound {
            column: col.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn scenario_s4_descending_second_column() {
        let index = Index {
            name: "idx".to_string(),
            index_type: IndexType::Normal,
            columns: vec![
                index_column("msg_code", Collation::Asc),
                index_column("msg_seq", Collation::Desc),
            ],
            is_unique: false,
            is_visible: true,
            db: "d".to_string(),
            table: "t".to_string(),
        };
        let min = KeyBound {
            index_name: Some("idx".to_string()),
            operator: Some("=".to_string()),
            bounds: vec![bound("msg_code", "MSG001")],
        };
        let max = KeyBound {
            index_name: Some("idx".to_string()),
            operator: Some("<".to_string()),
            bounds: vec![bound("msg_code", "MSG001"), bound("msg_seq", "200")],
        };
        let cond = decode_index_range_cond(Some(&min), Some(&max), &index, |c| {
            Some(if c == "msg_seq" { "int".to_string() } else { "varchar(20)".to_string() })
        })
        .unwrap();

        assert_eq!(cond.ranges.len(), 2);
        assert!(cond.ranges[0].is_singlepoint());
        let seq_range = &cond.ranges[1];
        assert_eq!(seq_range.min_op, Some(CmpOp::Gt));
        assert_eq!(seq_range.min_side, Some(Side::Right));
        assert!(seq_range.max_op.is_none());
    }

    #[test]
    fn scenario_s5_single_descending_column() {
        let index = Index {
            name: "idx".to_string(),
            index_type: IndexType::Normal,
            columns: vec![index_column("msg_seq", Collation::Desc)],
            is_unique: false,
            is_visible: true,
            db: "d".to_string(),
            table: "t".to_string(),
        };
        let min = KeyBound {
            index_name: Some("idx".to_string()),
            operator: Some(">".to_string()),
            bounds: vec![bound("msg_seq", "400")],
        };
        let cond = decode_index_range_cond(Some(&min), None, &index, |_| Some("int".to_string())).unwrap();
        assert_eq!(cond.ranges.len(), 1);
        let r = &cond.ranges[0];
        assert!(r.min_op.is_none());
        assert_eq!(r.max_op, Some(CmpOp::Lt));
        assert_eq!(r.max_side, Some(Side::Left));
    }

    #[test]
    fn scenario_s3_closed_range_on_decimal_column() {
        let index = Index {
            name: "idx".to_string(),
            index_type: IndexType::Normal,
            columns: vec![index_column("i_price", Collation::Asc)],
            is_unique: false,
            is_visible: true,
            db: "d".to_string(),
            table: "t".to_string(),
        };
        let min = KeyBound {
            index_name: Some("idx".to_string()),
            operator: Some(">".to_string()),
            bounds: vec![bound("i_price", "2")],
        };
        let max = KeyBound {
            index_name: Some("idx".to_string()),
            operator: Some(">".to_string()),
            bounds: vec![bound("i_price", "4")],
        };
        let cond = decode_index_range_cond(Some(&min), Some(&max), &index, |_| Some("decimal".to_string())).unwrap();
        let r = &cond.ranges[0];
        assert_eq!(r.min_op, Some(CmpOp::Gt));
        assert_eq!(r.min_side, Some(Side::Right));
        assert_eq!(r.max_op, Some(CmpOp::Lte));
        assert_eq!(r.max_side, Some(Side::Right));
    }
}
