//! The value codec (component C1): parsing and normalizing literal values that arrive as
//! plain text (request payload fields, histogram bucket bounds) into a comparable domain,
//! and formatting them back out the same way the originating column type would expect.

use std::cmp::Ordering;
use std::fmt;

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EstimatorError, Result};

static BASE64_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^base64:type254:(?P<payload>.*)$").unwrap());

/// A decoded literal, tagged by the kind of comparison it supports. Comparisons across tags
/// are a programming error in this codebase: callers must classify a column's data type once
/// and decode every value of that column through the same `ValueType`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    /// An integer literal wider than 64 bits, kept as its decimal text.
    BigInt(String),
    Float(f64),
    Str(String),
    Json(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// A degenerate date/datetime literal (zero date, sub-4-digit year) preserved verbatim
    /// rather than normalized, since MySQL's "zero date" conventions have no real calendar
    /// meaning and reformatting them would silently invent one.
    RawTemporal(String),
}

/// The classification used to pick a decode/encode strategy for a `data_type` string such as
/// `"varchar(255)"` or `"bigint unsigned"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Float,
    Str,
    Json,
    Date,
    DateTime,
}

/// Classifies a MySQL-flavored `data_type`/`column_type` string the way `estimate_column_length`
/// and friends do: take the leading alphabetic run and match against known families.
pub fn classify_data_type(data_type: &str) -> Result<ValueType> {
    let lowered = data_type.to_lowercase();
    let base = lowered
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|s| !s.is_empty())
        .unwrap_or("");
    match base {
        "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "year" => {
            Ok(ValueType::Int)
        }
        "float" | "double" | "decimal" | "numeric" => Ok(ValueType::Float),
        "char" | "varchar" | "text" | "longtext" | "mediumtext" | "tinytext" | "blob"
        | "enum" | "set" => Ok(ValueType::Str),
        "json" => Ok(ValueType::Json),
        "date" => Ok(ValueType::Date),
        "datetime" | "timestamp" => Ok(ValueType::DateTime),
        "" => Err(EstimatorError::UnsupportedType(data_type.to_string())),
        other => Err(EstimatorError::UnsupportedType(other.to_string())),
    }
}

fn is_null_literal(raw: &str) -> bool {
    matches!(raw, "NULL" | "None")
}

/// Strips one outer matching pair of backtick, single- or double-quote, if present.
fn strip_one_outer_quote_pair(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if first == last && matches!(first, b'`' | b'\'' | b'"') {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn decode_string_like(raw: &str) -> Result<String> {
    if let Some(caps) = BASE64_PREFIX_RE.captures(raw) {
        let payload = &caps["payload"];
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| EstimatorError::InvalidLiteral {
                value: raw.to_string(),
                data_type: "base64".to_string(),
            })?;
        let decoded = String::from_utf8(bytes).map_err(|_| EstimatorError::InvalidLiteral {
            value: raw.to_string(),
            data_type: "base64".to_string(),
        })?;
        return Ok(strip_one_outer_quote_pair(&decoded).to_string());
    }
    Ok(strip_one_outer_quote_pair(raw).to_string())
}

fn decode_int(raw: &str) -> Result<Value> {
    // integers allow a decimal point; the fractional part is truncated.
    let truncated = raw.split('.').next().unwrap_or(raw);
    let truncated = truncated.trim();
    if truncated.is_empty() || !truncated.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) {
        return Err(EstimatorError::InvalidLiteral {
            value: raw.to_string(),
            data_type: "int".to_string(),
        });
    }
    match truncated.parse::<i64>() {
        Ok(n) => Ok(Value::Int(n)),
        Err(_) => Ok(Value::BigInt(truncated.to_string())),
    }
}

fn decode_float(raw: &str) -> Result<Value> {
    raw.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| EstimatorError::InvalidLiteral {
            value: raw.to_string(),
            data_type: "float".to_string(),
        })
}

/// A date/datetime literal whose year component has fewer than 4 digits, or which is the
/// all-zero MySQL placeholder, carries no well-defined calendar meaning.
fn is_degenerate_temporal(raw: &str) -> bool {
    if raw == "0000-00-00" || raw.starts_with("0000-00-00 ") {
        return true;
    }
    match raw.split('-').next() {
        Some(year) => year.len() != 4,
        None => false,
    }
}

fn parse_naive_datetime(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

fn epoch_to_datetime(raw: &str) -> Option<NaiveDateTime> {
    let digits = raw.trim_start_matches('-');
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let n: i128 = raw.parse().ok()?;
    let (secs, nanos) = match digits.len() {
        0..=10 => (n as i64, 0u32),
        11..=13 => ((n / 1_000) as i64, ((n % 1_000).unsigned_abs() as u32) * 1_000_000),
        14..=16 => ((n / 1_000_000) as i64, ((n % 1_000_000).unsigned_abs() as u32) * 1_000),
        _ => ((n / 1_000_000_000) as i64, (n % 1_000_000_000).unsigned_abs() as u32),
    };
    chrono::DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}

fn decode_temporal(raw: &str, date_only: bool) -> Result<Value> {
    if is_degenerate_temporal(raw) {
        return Ok(Value::RawTemporal(raw.to_string()));
    }
    let is_plain_epoch = !raw.is_empty()
        && raw
            .trim_start_matches('-')
            .chars()
            .all(|c| c.is_ascii_digit());
    let parsed = if is_plain_epoch {
        epoch_to_datetime(raw)
    } else {
        parse_naive_datetime(raw)
    };
    match parsed {
        Some(dt) if date_only => Ok(Value::Date(dt.date())),
        Some(dt) => Ok(Value::DateTime(dt)),
        None => Err(EstimatorError::InvalidLiteral {
            value: raw.to_string(),
            data_type: if date_only { "date" } else { "datetime" }.to_string(),
        }),
    }
}

/// Decodes a raw literal (as it appears in a request payload or metadata file) against a
/// `data_type` string, per §4.1.
pub fn decode(raw: &str, data_type: &str) -> Result<Value> {
    if is_null_literal(raw) {
        return Ok(Value::Null);
    }
    match classify_data_type(data_type)? {
        ValueType::Int => decode_int(raw),
        ValueType::Float => decode_float(raw),
        ValueType::Str => decode_string_like(raw).map(Value::Str),
        ValueType::Json => decode_string_like(raw).map(Value::Json),
        ValueType::Date => decode_temporal(raw, true),
        ValueType::DateTime => decode_temporal(raw, false),
    }
}

/// Encodes a decoded value back to its canonical textual form.
pub fn encode(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(n) => n.to_string(),
        Value::BigInt(s) => s.clone(),
        Value::Float(f) => format!("{f}"),
        Value::Str(s) => s.clone(),
        Value::Json(s) => s.clone(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        Value::RawTemporal(s) => s.clone(),
    }
}

impl Value {
    /// Compares two values of the same tag. Cross-tag comparisons (including `BigInt` vs.
    /// `Int`, which are reconciled via `i128`) are a codec misuse and return an error rather
    /// than a false ordering.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ok(Ordering::Equal),
            (Int(a), Int(b)) => Ok(a.cmp(b)),
            (BigInt(a), BigInt(b)) => Ok(parse_i128(a).cmp(&parse_i128(b))),
            (Int(a), BigInt(b)) => Ok((*a as i128).cmp(&parse_i128(b))),
            (BigInt(a), Int(b)) => Ok(parse_i128(a).cmp(&(*b as i128))),
            (Float(a), Float(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| EstimatorError::internal("NaN comparison")),
            (Str(a), Str(b)) | (Json(a), Json(b)) => Ok(a.cmp(b)),
            (Date(a), Date(b)) => Ok(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Ok(a.cmp(b)),
            (RawTemporal(a), RawTemporal(b)) => Ok(a.cmp(b)),
            _ => Err(EstimatorError::internal(format!(
                "cross-tag comparison between {self:?} and {other:?}"
            ))),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widens an integer-tagged value to `f64` for histogram arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::BigInt(s) => parse_i128_opt(s).map(|n| n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

fn parse_i128(s: &str) -> i128 {
    parse_i128_opt(s).unwrap_or(0)
}

fn parse_i128_opt(s: &str) -> Option<i128> {
    s.parse::<i128>().ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode(self))
    }
}

/// Serializes wide integers in the `{"bigint": "<string>"}` wire form documented in §9, and
/// every other variant as its natural JSON shape.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::BigInt(s) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("bigint", s)?;
                map.end()
            }
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::Str(s) | Value::Json(s) | Value::RawTemporal(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => {
                serializer.serialize_str(&dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a number, string, null, or {\"bigint\": \"...\"}")
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Value, E> {
        match i64::try_from(v) {
            Ok(n) => Ok(Value::Int(n)),
            Err(_) => Ok(Value::BigInt(v.to_string())),
        }
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::Str(v.to_string()))
    }

    fn visit_none<E>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        if let Some((key, value)) = map.next_entry::<String, String>()? {
            if key == "bigint" {
                return Ok(Value::BigInt(value));
            }
        }
        Err(de::Error::custom("expected a {\"bigint\": \"...\"} object"))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_integers() {
        assert!(matches!(decode("42", "int").unwrap(), Value::Int(42)));
        assert!(matches!(decode("42.9", "int").unwrap(), Value::Int(42)));
    }

    #[test]
    fn decodes_overflowing_integers_as_bigint() {
        let v = decode("99999999999999999999", "bigint").unwrap();
        assert!(matches!(v, Value::BigInt(ref s) if s == "99999999999999999999"));
    }

    #[test]
    fn decodes_null_literals() {
        assert!(matches!(decode("NULL", "varchar(10)").unwrap(), Value::Null));
        assert!(matches!(decode("None", "int").unwrap(), Value::Null));
    }

    #[test]
    fn strips_quotes_and_decodes_base64() {
        let v = decode("'hello'", "varchar(10)").unwrap();
        assert!(matches!(v, Value::Str(ref s) if s == "hello"));

        let encoded = base64::engine::general_purpose::STANDARD.encode("world");
        let v = decode(&format!("base64:type254:{encoded}"), "varchar(10)").unwrap();
        assert!(matches!(v, Value::Str(ref s) if s == "world"));
    }

    #[test]
    fn decodes_dates_and_epochs() {
        let v = decode("2024-01-15", "date").unwrap();
        assert!(matches!(v, Value::Date(d) if d.to_string() == "2024-01-15"));

        let v = decode("1705276800", "datetime").unwrap();
        assert!(matches!(v, Value::DateTime(_)));
    }

    #[test]
    fn degenerate_dates_pass_through() {
        let v = decode("0000-00-00", "date").unwrap();
        assert!(matches!(v, Value::RawTemporal(ref s) if s == "0000-00-00"));

        let v = decode("1-01-01 00:00:00", "datetime").unwrap();
        assert!(matches!(v, Value::RawTemporal(ref s) if s == "1-01-01 00:00:00"));
    }

    #[test]
    fn round_trips_datetime_canonical_form() {
        let v = decode("2024-01-15 10:30:00", "datetime").unwrap();
        assert_eq!(encode(&v), "2024-01-15 10:30:00.000000");
    }

    #[test]
    fn rejects_cross_tag_comparison() {
        let a = Value::Int(1);
        let b = Value::Str("1".to_string());
        assert!(a.compare(&b).is_err());
    }
}
