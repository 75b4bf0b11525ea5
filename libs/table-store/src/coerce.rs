//! Record ↔ Row conversion against a table schema.
//!
//! Going in, every column is cast to its declared type. Timestamps are
//! normalized to microseconds. A missing or null value in a required column
//! fails the whole record. Fields the schema does not know are ignored.

use serde_json::Value;

use fabric_api::{Datum, FabricError, Field, FieldType, Record, Row, TableSchema, parse_timestamp_lenient};

use crate::error::CatalogError;

pub fn record_to_row(schema: &TableSchema, record: &Record) -> Result<Row, FabricError> {
    let values = schema
        .fields
        .iter()
        .map(|field| match record.get(&field.name) {
            None | Some(Value::Null) if field.required => {
                Err(fail(field, "required value is missing or null"))
            }
            None | Some(Value::Null) => Ok(None),
            Some(v) => coerce_value(field, v).map(Some),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row { values })
}

pub fn row_to_record(schema: &TableSchema, row: &Row) -> Record {
    schema
        .fields
        .iter()
        .zip(row.values.iter())
        .map(|(field, v)| {
            let json = v.as_ref().map_or(Value::Null, Datum::to_json);
            (field.name.clone(), json)
        })
        .collect()
}

fn coerce_value(field: &Field, v: &Value) -> Result<Datum, FabricError> {
    match field.field_type {
        FieldType::String => match v {
            Value::String(s) => Ok(Datum::String(s.clone())),
            Value::Number(n) => Ok(Datum::String(n.to_string())),
            Value::Bool(b) => Ok(Datum::String(b.to_string())),
            _ => Err(fail(field, "expected a scalar")),
        },
        FieldType::Int => {
            let n = as_integer(field, v)?;
            i32::try_from(n)
                .map(Datum::Int)
                .map_err(|_| fail(field, &format!("{n} out of range for int")))
        }
        FieldType::Long => as_integer(field, v).map(Datum::Long),
        FieldType::Float => {
            let f = as_finite(field, v)? as f32;
            if f.is_finite() {
                Ok(Datum::Float(f))
            } else {
                Err(fail(field, "out of range for float"))
            }
        }
        FieldType::Double => as_finite(field, v).map(Datum::Double),
        FieldType::Timestamp => match v {
            Value::String(s) => parse_timestamp_lenient(s)
                .map(|dt| Datum::Timestamp(dt.timestamp_micros()))
                .ok_or_else(|| fail(field, &format!("'{s}' is not a timestamp"))),
            Value::Number(n) => n
                .as_i64()
                .map(Datum::Timestamp)
                .ok_or_else(|| fail(field, "numeric timestamps must be integer microseconds")),
            _ => Err(fail(field, "expected a timestamp")),
        },
    }
}

fn as_integer(field: &Field, v: &Value) -> Result<i64, FabricError> {
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(fail(field, &format!("{n} is not an integer"))),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| fail(field, &format!("'{s}' is not an integer"))),
        _ => Err(fail(field, "expected an integer")),
    }
}

fn as_finite(field: &Field, v: &Value) -> Result<f64, FabricError> {
    let f = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match f {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(fail(field, &format!("{v} is not a finite number"))),
    }
}

fn fail(field: &Field, reason: &str) -> FabricError {
    CatalogError::Coercion { column: field.name.clone(), reason: reason.to_string() }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_api::ErrorKind;
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Field::required(1, "window_start", FieldType::Timestamp),
            Field::required(2, "total_events", FieldType::Long),
            Field::required(3, "avg_temp", FieldType::Float),
            Field::required(4, "anomaly_count", FieldType::Int),
            Field::optional(5, "note", FieldType::String),
        ])
    }

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn casts_to_declared_types() {
        let row = record_to_row(
            &schema(),
            &rec(json!({
                "window_start": "2026-03-01T10:00:00.123456+00:00",
                "total_events": 97,
                "avg_temp": "77.5",
                "anomaly_count": 12.0,
                "extra": "ignored"
            })),
        )
        .unwrap();
        assert_eq!(
            row.values,
            vec![
                Some(Datum::Timestamp(1_772_359_200_123_456)),
                Some(Datum::Long(97)),
                Some(Datum::Float(77.5)),
                Some(Datum::Int(12)),
                None,
            ]
        );
    }

    #[test]
    fn normalizes_offsets_to_utc_micros() {
        let a = record_to_row(&schema(), &rec(json!({
            "window_start": "2026-03-01T12:00:00+02:00", "total_events": 1, "avg_temp": 1, "anomaly_count": 0
        })))
        .unwrap();
        assert_eq!(a.values[0], Some(Datum::Timestamp(1_772_359_200_000_000)));
    }

    #[test]
    fn required_null_fails_loudly() {
        let err = record_to_row(&schema(), &rec(json!({
            "window_start": null, "total_events": 1, "avg_temp": 1.0, "anomaly_count": 0
        })))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.message().contains("window_start"));
    }

    #[test]
    fn rejects_uncastable_values() {
        let base = json!({"window_start": "2026-03-01T10:00:00Z", "total_events": 1, "avg_temp": 1.0, "anomaly_count": 0});
        for (k, v) in [
            ("total_events", json!(1.5)),
            ("avg_temp", json!("warm")),
            ("anomaly_count", json!(3_000_000_000i64)),
            ("window_start", json!("noon")),
        ] {
            let mut r = rec(base.clone());
            r.insert(k.to_string(), v);
            assert!(record_to_row(&schema(), &r).is_err(), "{k} should fail");
        }
    }

    #[test]
    fn row_renders_back_to_json() {
        let r = rec(json!({"window_start": "2026-03-01T10:00:00Z", "total_events": 3, "avg_temp": 70.25, "anomaly_count": 1}));
        let back = row_to_record(&schema(), &record_to_row(&schema(), &r).unwrap());
        assert_eq!(back["window_start"], json!("2026-03-01T10:00:00.000000+00:00"));
        assert_eq!(back["total_events"], json!(3));
        assert_eq!(back["avg_temp"], json!(70.25));
        assert_eq!(back["note"], Value::Null);
    }
}
