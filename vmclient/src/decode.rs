//! Decoding of instant and range query result envelopes.
//!
//! Both envelopes look like `{status, data: {result: [...]}}`. Instant
//! results carry a single `value: [timestamp, "value"]`, range results a
//! `values` array of such pairs. Pairs are heterogeneous JSON arrays, so each
//! is validated once here and turned into a typed [`Sample`]; the first bad
//! element aborts the whole decode and no partial results are returned.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::model::{Instant, LabelSet, Range, Sample};

/// Envelope status of a successful query.
pub const STATUS_SUCCESS: &str = "success";

// Missing and `null` fields decode as empty.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    data: Option<ResultData<T>>,
}

#[derive(Debug, Deserialize)]
struct ResultData<T> {
    result: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
struct RawInstant {
    metric: Option<HashMap<String, String>>,
    value: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawRange {
    metric: Option<HashMap<String, String>>,
    values: Option<Vec<Vec<Value>>>,
}

/// Decodes an instant query body.
///
/// A `value` with no elements leaves the sample at its zero value; with one
/// element only the timestamp is set. Extra elements are ignored.
///
/// # Errors
///
/// Returns `DecodeError` if the body is not a valid envelope, the status is
/// not `success`, or any result carries a mistyped element.
pub fn decode_instant(body: &[u8]) -> Result<Vec<Instant>, DecodeError> {
    let results = open_envelope::<RawInstant>(body)?;
    results
        .into_iter()
        .map(|raw| -> Result<Instant, DecodeError> {
            let value = raw.value.unwrap_or_default();
            let mut sample = Sample::default();
            if let Some(ts) = value.first() {
                sample.timestamp = parse_timestamp(ts)?;
            }
            if let Some(value) = value.get(1) {
                sample.value = parse_value(value)?;
            }
            Ok(Instant {
                labels: LabelSet::from(raw.metric.unwrap_or_default()),
                sample,
            })
        })
        .collect()
}

/// Decodes a range query body.
///
/// Unlike [`decode_instant`], every entry of `values` must be a complete
/// `[timestamp, "value"]` pair.
///
/// # Errors
///
/// Returns `DecodeError` if the body is not a valid envelope, the status is
/// not `success`, or any entry is not a well-typed two-element pair.
pub fn decode_range(body: &[u8]) -> Result<Vec<Range>, DecodeError> {
    let results = open_envelope::<RawRange>(body)?;
    results
        .into_iter()
        .map(|raw| -> Result<Range, DecodeError> {
            let values = raw
                .values
                .unwrap_or_default()
                .into_iter()
                .map(parse_pair)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Range {
                labels: LabelSet::from(raw.metric.unwrap_or_default()),
                values,
            })
        })
        .collect()
}

/// Parses the envelope and checks its status.
fn open_envelope<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<Vec<T>, DecodeError> {
    let envelope: Envelope<T> =
        serde_json::from_slice(body).map_err(|e| DecodeError::Json { source: e })?;
    if envelope.status != STATUS_SUCCESS {
        return Err(DecodeError::WrongStatus {
            status: envelope.status,
        });
    }
    Ok(envelope
        .data
        .and_then(|d| d.result)
        .unwrap_or_default())
}

/// Validates a `[timestamp, "value"]` pair.
fn parse_pair(pair: Vec<Value>) -> Result<Sample, DecodeError> {
    if let [ts, value] = pair.as_slice() {
        return Ok(Sample {
            timestamp: parse_timestamp(ts)?,
            value: parse_value(value)?,
        });
    }
    Err(DecodeError::Arity {
        len: pair.len(),
        values: pair,
    })
}

/// Converts floating Unix seconds to an absolute time.
///
/// Seconds are multiplied by 1000 and truncated to whole milliseconds, so
/// anything finer than a millisecond is dropped.
///
/// # Errors
///
/// Returns `DecodeError::TimestampType` for a non-number and
/// `DecodeError::TimestampRange` for a time chrono cannot represent.
#[allow(clippy::cast_possible_truncation)] // truncation to ms is the documented precision
pub fn parse_timestamp(raw: &Value) -> Result<DateTime<Utc>, DecodeError> {
    let seconds = raw
        .as_f64()
        .ok_or_else(|| DecodeError::TimestampType { value: raw.clone() })?;
    let millis = (seconds * 1000.0) as i64;
    DateTime::from_timestamp_millis(millis).ok_or(DecodeError::TimestampRange { seconds })
}

/// Parses a decimal number sent as a JSON string.
///
/// Accepts the `NaN`, `+Inf` and `-Inf` spellings the server uses.
///
/// # Errors
///
/// Returns `DecodeError::ValueType` for a non-string and
/// `DecodeError::ValueParse` for a string that is not a number.
pub fn parse_value(raw: &Value) -> Result<f64, DecodeError> {
    let text = raw
        .as_str()
        .ok_or_else(|| DecodeError::ValueType { value: raw.clone() })?;
    text.parse::<f64>().map_err(|e| DecodeError::ValueParse {
        value: text.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    fn instant_body(value: Value) -> Vec<u8> {
        body(&json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{"metric": {"__name__": "up", "job": "x"}, "value": value}]
            }
        }))
    }

    fn range_body(values: Value) -> Vec<u8> {
        body(&json!({
            "status": "success",
            "data": {
                "resultType": "matrix",
                "result": [{"metric": {"__name__": "up"}, "values": values}]
            }
        }))
    }

    #[test]
    fn test_instant_fractional_timestamp() {
        let decoded = decode_instant(&instant_body(json!([1_700_000_000.5, "10"]))).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].value(), 10.0);
        assert_eq!(decoded[0].timestamp().timestamp_millis(), 1_700_000_000_500);
        assert_eq!(decoded[0].labels.get("job"), Some("x"));
        assert_eq!(decoded[0].name(), "up");
    }

    #[test]
    fn test_instant_sub_millisecond_is_truncated() {
        let decoded = decode_instant(&instant_body(json!([1.0009, "1"]))).unwrap();
        assert_eq!(decoded[0].timestamp().timestamp_millis(), 1000);
    }

    #[test]
    fn test_instant_empty_value_is_zero() {
        let decoded = decode_instant(&instant_body(json!([]))).unwrap();
        assert_eq!(decoded[0].value(), 0.0);
        assert_eq!(decoded[0].timestamp(), DateTime::<Utc>::default());
    }

    #[test]
    fn test_instant_single_element_sets_only_timestamp() {
        let decoded = decode_instant(&instant_body(json!([42]))).unwrap();
        assert_eq!(decoded[0].value(), 0.0);
        assert_eq!(decoded[0].timestamp().timestamp_millis(), 42_000);
    }

    #[test]
    fn test_instant_special_values() {
        let decoded = decode_instant(&instant_body(json!([1, "+Inf"]))).unwrap();
        assert!(decoded[0].value().is_infinite());
        let decoded = decode_instant(&instant_body(json!([1, "NaN"]))).unwrap();
        assert!(decoded[0].value().is_nan());
    }

    #[test]
    fn test_instant_type_mismatch() {
        let err = decode_instant(&instant_body(json!(["1700000000", "10"]))).unwrap_err();
        assert!(matches!(err, DecodeError::TimestampType { .. }));

        let err = decode_instant(&instant_body(json!([1_700_000_000, 10]))).unwrap_err();
        assert!(matches!(err, DecodeError::ValueType { .. }));

        let err = decode_instant(&instant_body(json!([1_700_000_000, "ten"]))).unwrap_err();
        assert!(matches!(err, DecodeError::ValueParse { ref value, .. } if value == "ten"));
    }

    #[test]
    fn test_instant_one_bad_result_aborts_all() {
        let raw = body(&json!({
            "status": "success",
            "data": {"result": [
                {"metric": {"__name__": "a"}, "value": [1, "1"]},
                {"metric": {"__name__": "b"}, "value": [1, true]}
            ]}
        }));
        assert!(decode_instant(&raw).is_err());
    }

    #[test]
    fn test_instant_keeps_source_order() {
        let raw = body(&json!({
            "status": "success",
            "data": {"result": [
                {"metric": {"__name__": "z"}, "value": [1, "1"]},
                {"metric": {"__name__": "a"}, "value": [2, "2"]},
                {"metric": {"__name__": "m"}, "value": [3, "3"]}
            ]}
        }));
        let names: Vec<_> = decode_instant(&raw)
            .unwrap()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn test_wrong_status() {
        let raw = body(&json!({"status": "error", "data": {"result": []}}));
        let err = decode_instant(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::WrongStatus { ref status } if status == "error"));
        let err = decode_range(&raw).unwrap_err();
        assert_eq!(err.to_string(), "wrong status: error");
    }

    #[test]
    fn test_missing_data_is_empty() {
        let raw = body(&json!({"status": "success"}));
        assert!(decode_instant(&raw).unwrap().is_empty());
        assert!(decode_range(&raw).unwrap().is_empty());
    }

    #[test]
    fn test_null_fields_are_empty() {
        let raw = body(&json!({"status": "success", "data": null}));
        assert!(decode_instant(&raw).unwrap().is_empty());

        let raw = body(&json!({"status": "success", "data": {"result": null}}));
        assert!(decode_instant(&raw).unwrap().is_empty());
        assert!(decode_range(&raw).unwrap().is_empty());

        let raw = body(&json!({
            "status": "success",
            "data": {"result": [{"metric": null, "value": null}]}
        }));
        let decoded = decode_instant(&raw).unwrap();
        assert_eq!(decoded.len(), 1);
        assert!(decoded[0].labels.is_empty());
        assert_eq!(decoded[0].sample, Sample::default());

        let raw = body(&json!({
            "status": "success",
            "data": {"result": [{"metric": null, "values": null}]}
        }));
        let decoded = decode_range(&raw).unwrap();
        assert_eq!(decoded[0].name(), "");
        assert!(decoded[0].values.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        let err = decode_range(b"{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json { .. }));
    }

    #[test]
    fn test_range_values_in_order() {
        let decoded = decode_range(&range_body(json!([
            [1_700_000_000, "1"],
            [1_700_000_060, "2.5"],
            [1_700_000_120, "4"]
        ])))
        .unwrap();
        assert_eq!(decoded.len(), 1);
        let values: Vec<_> = decoded[0].values.iter().map(|s| s.value).collect();
        assert_eq!(values, [1.0, 2.5, 4.0]);
        assert_eq!(
            decoded[0].values[1].timestamp.timestamp_millis(),
            1_700_000_060_000
        );
        assert_eq!(decoded[0].to_string(), "up{}");
    }

    #[test]
    fn test_range_rejects_wrong_arity() {
        for bad in [json!([1_700_000_060]), json!([1_700_000_060, "2", "3"]), json!([])] {
            let err = decode_range(&range_body(json!([[1_700_000_000, "1"], bad]))).unwrap_err();
            assert!(matches!(err, DecodeError::Arity { .. }), "{err}");
        }
    }

    #[test]
    fn test_range_type_mismatch() {
        let err = decode_range(&range_body(json!([[1, 2]]))).unwrap_err();
        assert!(matches!(err, DecodeError::ValueType { .. }));
    }

    #[test]
    fn test_range_empty_values() {
        let decoded = decode_range(&range_body(json!([]))).unwrap();
        assert!(decoded[0].values.is_empty());
    }
}
