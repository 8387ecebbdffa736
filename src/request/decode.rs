//! Decoding of compact columnar responses into keyed rows.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::db::CompactRows;
use crate::types::{Row, Value};

/// Marker for timestamp column types (`DateTime`, `DateTime64(3)`,
/// `Nullable(DateTime('UTC'))`, ...).
const TIMESTAMP_TYPE_MARKER: &str = "DateTime";

/// Decodes `[field_names, field_types, ...rows]` into rows keyed by field name.
///
/// A response without data rows decodes to an empty vector. Row order is kept.
/// Missing trailing cells decode as JSON `null`.
pub fn decode_rows(data: CompactRows) -> Vec<Row> {
    if data.len() < 3 {
        return Vec::new();
    }

    let mut data = data.into_iter();
    let fields = header_strings(data.next().unwrap_or_default());
    let types = header_strings(data.next().unwrap_or_default());

    data.map(|mut cells| {
        cells.resize(fields.len().max(cells.len()), serde_json::Value::Null);
        let values = fields
            .iter()
            .zip(cells)
            .enumerate()
            .map(|(index, (field, raw))| {
                let column_type = types.get(index).map(String::as_str).unwrap_or("");
                (field.clone(), decode_value(column_type, raw))
            })
            .collect();
        Row::new(values)
    })
    .collect()
}

fn header_strings(header: Vec<serde_json::Value>) -> Vec<String> {
    header
        .into_iter()
        .map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

/// Converts textual timestamp cells; everything else passes through.
fn decode_value(column_type: &str, raw: serde_json::Value) -> Value {
    if column_type.contains(TIMESTAMP_TYPE_MARKER) {
        if let Some(parsed) = raw.as_str().and_then(parse_timestamp) {
            return Value::DateTime(parsed);
        }
    }
    Value::Json(raw)
}

/// Parses ISO-8601 output (`2024-01-01T00:00:00Z`) and the plain
/// `2024-01-01 00:00:00` form, which is read as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;
    use serde_json::json;

    fn response(rows: Vec<serde_json::Value>) -> CompactRows {
        let mut data = vec![
            vec![json!("id"), json!("name"), json!("created_at")],
            vec![json!("UInt32"), json!("String"), json!("DateTime")],
        ];
        data.extend(rows.into_iter().map(|row| match row {
            serde_json::Value::Array(cells) => cells,
            other => vec![other],
        }));
        data
    }

    #[rstest]
    fn test_headers_only_decodes_to_empty() {
        assert!(decode_rows(response(vec![])).is_empty());
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![vec![json!("id")]])]
    fn test_short_responses_decode_to_empty(#[case] data: CompactRows) {
        assert!(decode_rows(data).is_empty());
    }

    #[rstest]
    fn test_rows_keep_order_and_values() {
        let rows = decode_rows(response(vec![
            json!([2, "b", "2024-01-02T00:00:00Z"]),
            json!([1, "a", "2024-01-01T00:00:00Z"]),
        ]));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id").and_then(Value::as_i64), Some(2));
        assert_eq!(rows[1].get("name").and_then(Value::as_str), Some("a"));
    }

    #[rstest]
    fn test_datetime_column_is_coerced() {
        let rows = decode_rows(response(vec![json!([1, "a", "2024-01-01T00:00:00Z"])]));
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(rows[0].get("created_at").and_then(Value::as_datetime), Some(&expected));
    }

    #[rstest]
    fn test_same_text_in_string_column_stays_string() {
        let rows = decode_rows(response(vec![json!([1, "2024-01-01T00:00:00Z", "2024-01-01T00:00:00Z"])]));
        assert_eq!(
            rows[0].get("name").and_then(Value::as_str),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[rstest]
    fn test_nullable_datetime_null_passes_through() {
        let data = vec![
            vec![json!("ts")],
            vec![json!("Nullable(DateTime64(3))")],
            vec![json!(null)],
            vec![json!("2024-05-06T07:08:09.123Z")],
        ];
        let rows = decode_rows(data);
        assert_eq!(rows[0].get("ts"), Some(&Value::Json(json!(null))));
        assert!(rows[1].get("ts").and_then(Value::as_datetime).is_some());
    }

    #[rstest]
    fn test_unparseable_timestamp_text_is_kept() {
        let data = vec![vec![json!("ts")], vec![json!("DateTime")], vec![json!("soon")]];
        let rows = decode_rows(data);
        assert_eq!(rows[0].get("ts").and_then(Value::as_str), Some("soon"));
    }

    #[rstest]
    fn test_missing_cells_decode_as_null() {
        let data = vec![
            vec![json!("a"), json!("b")],
            vec![json!("UInt8"), json!("UInt8")],
            vec![json!(1)],
        ];
        let rows = decode_rows(data);
        assert_eq!(rows[0].get("b"), Some(&Value::Json(json!(null))));
    }

    #[rstest]
    fn test_decoding_is_pure() {
        let data = response(vec![json!([1, "a", "2024-01-01T00:00:00Z"])]);
        assert_eq!(decode_rows(data.clone()), decode_rows(data));
    }

    #[rstest]
    #[case("2024-01-01T00:00:00Z")]
    #[case("2024-01-01T02:00:00+02:00")]
    #[case("2024-01-01 00:00:00")]
    #[case("2024-01-01T00:00:00.000")]
    fn test_parse_timestamp_forms(#[case] text: &str) {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp(text), Some(expected));
    }
}
