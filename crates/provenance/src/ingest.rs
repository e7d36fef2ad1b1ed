//! Turning upstream JSON into records.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::record::Record;

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse an array of records.
///
/// A non-array value is an [`EngineError::InvalidArgument`]. Individual
/// elements that do not parse as records are skipped, never reported as
/// errors.
pub fn records_from_json(value: &Value) -> Result<Vec<Record>, EngineError> {
    let items = value.as_array().ok_or_else(|| {
        EngineError::InvalidArgument(format!(
            "expected an array of records, got {}",
            json_kind(value)
        ))
    })?;

    let mut records = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for (index, item) in items.iter().enumerate() {
        match Record::deserialize(item) {
            Ok(record) => records.push(record),
            Err(err) => {
                skipped += 1;
                trace!(index, "skipping malformed record: {err}");
            }
        }
    }

    if skipped > 0 {
        debug!(skipped, kept = records.len(), "skipped malformed records");
    }
    Ok(records)
}

/// Parse a JSON document holding an array of records.
pub fn records_from_slice(bytes: &[u8]) -> Result<Vec<Record>, EngineError> {
    let value: Value = serde_json::from_slice(bytes)?;
    records_from_json(&value)
}

#[cfg(test)]
mod tests {
    use super::{records_from_json, records_from_slice};
    use crate::cluster::{cluster_arcs, Granularity};
    use crate::error::EngineError;
    use crate::record::RecordId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn rejects_non_arrays() {
        for value in [json!({ "id": 1 }), json!(null), json!("records"), json!(3)] {
            match records_from_json(&value) {
                Err(EngineError::InvalidArgument(msg)) => {
                    assert!(msg.starts_with("expected an array"), "{msg}")
                }
                other => panic!("expected InvalidArgument, got {other:?}"),
            }
        }
    }

    #[test]
    fn skips_elements_that_are_not_records() {
        let value = json!([
            { "id": 1, "origin": { "longitude": 1, "latitude": 2 } },
            "not a record",
            { "origin": {} },
            { "id": "b" }
        ]);
        let records = records_from_json(&value).unwrap();
        let ids: Vec<RecordId> = records.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RecordId::Number(1), RecordId::Text("b".into())]);
    }

    #[test]
    fn mistyped_fields_do_not_drop_records() {
        let origin = json!({ "longitude": 10, "latitude": 20 });
        let destination = json!({ "longitude": 30, "latitude": 40 });
        let value = json!([
            { "id": 1, "origin": origin, "destination": destination, "originLabels": null },
            { "id": 2, "origin": origin, "destination": destination, "originLabels": { "city": 75 } },
            { "id": 3.0, "origin": origin, "destination": destination },
            { "id": 4, "origin": origin, "destination": destination, "destinationLabels": "n/a" },
            { "id": 5, "origin": "unknown", "destination": destination }
        ]);
        let records = records_from_json(&value).unwrap();

        let ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, (1..=5).map(RecordId::Number).collect::<Vec<_>>());
        assert_eq!(records[1].origin_city(), Some("75"));
        assert!(!records[4].is_arc_eligible());

        let arcs = cluster_arcs(&records, Granularity::Object, 0);
        assert_eq!(arcs.len(), 1);
        assert_eq!(arcs[0].count, 4);
    }

    #[test]
    fn empty_array_is_fine() {
        assert!(records_from_json(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            records_from_slice(b"[{\"id\": 1"),
            Err(EngineError::Json(_))
        ));
        assert_eq!(records_from_slice(b"[{\"id\": 7}]").unwrap().len(), 1);
    }
}
