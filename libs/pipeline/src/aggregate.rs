use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::Serialize;
use serde_json::json;

use fabric_api::record::{number_field, str_field};
use fabric_api::{Record, parse_timestamp};

/// Rollup of one cleansed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    pub window_start: DateTime<FixedOffset>,
    pub window_end: DateTime<FixedOffset>,
    pub total_events: i64,
    /// Mean temperature, rounded to 2 decimals.
    pub avg_temp: f64,
    /// Records with status `WARNING`.
    pub anomaly_count: i32,
}

impl Kpi {
    pub fn to_record(&self) -> Record {
        let value = json!({
            "window_start": self.window_start.to_rfc3339_opts(SecondsFormat::Micros, false),
            "window_end": self.window_end.to_rfc3339_opts(SecondsFormat::Micros, false),
            "total_events": self.total_events,
            "avg_temp": self.avg_temp,
            "anomaly_count": self.anomaly_count,
        });
        match value {
            serde_json::Value::Object(map) => map,
            _ => Record::new(),
        }
    }
}

/// Aggregate validated records. `None` for an empty batch.
///
/// Records are expected to have passed validation; a record without a
/// parseable timestamp or temperature is left out of that statistic.
pub fn aggregate(records: &[Record]) -> Option<Kpi> {
    if records.is_empty() {
        return None;
    }
    let timestamps: Vec<DateTime<FixedOffset>> = records
        .iter()
        .filter_map(|r| str_field(r, "timestamp").and_then(parse_timestamp))
        .collect();
    let window_start = *timestamps.iter().min()?;
    let window_end = *timestamps.iter().max()?;

    let temps: Vec<f64> = records.iter().filter_map(|r| number_field(r, "temperature")).collect();
    let avg = if temps.is_empty() { 0.0 } else { temps.iter().sum::<f64>() / temps.len() as f64 };

    let anomaly_count = records
        .iter()
        .filter(|r| str_field(r, "status") == Some("WARNING"))
        .count() as i32;

    Some(Kpi {
        window_start,
        window_end,
        total_events: records.len() as i64,
        avg_temp: (avg * 100.0).round() / 100.0,
        anomaly_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ts: &str, temp: f64, status: &str) -> Record {
        json!({"timestamp": ts, "temperature": temp, "status": status})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn empty_batch_has_no_kpi() {
        assert_eq!(aggregate(&[]), None);
    }

    #[test]
    fn window_covers_every_timestamp() {
        let batch = vec![
            rec("2026-03-01T10:00:05+00:00", 70.0, "OK"),
            rec("2026-03-01T12:00:01+02:00", 80.0, "WARNING"),
            rec("2026-03-01T10:00:09Z", 76.0, "OK"),
        ];
        let kpi = aggregate(&batch).unwrap();
        assert_eq!(kpi.window_start.timestamp(), 1_772_359_201);
        assert_eq!(kpi.window_end.timestamp(), 1_772_359_209);
        for r in &batch {
            let ts = parse_timestamp(str_field(r, "timestamp").unwrap()).unwrap();
            assert!(kpi.window_start <= ts && ts <= kpi.window_end);
        }
        assert_eq!(kpi.total_events, 3);
        assert_eq!(kpi.anomaly_count, 1);
        assert_eq!(kpi.avg_temp, 75.33);
    }

    #[test]
    fn record_form_matches_kpi_table() {
        let kpi = aggregate(&[rec("2026-03-01T10:00:00Z", 61.0, "WARNING")]).unwrap();
        let r = kpi.to_record();
        assert_eq!(r["window_start"], json!("2026-03-01T10:00:00.000000+00:00"));
        assert_eq!(r["total_events"], json!(1));
        assert_eq!(r["anomaly_count"], json!(1));
    }
}
