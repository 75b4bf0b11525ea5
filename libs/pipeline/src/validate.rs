//! Sensor record validation. Pure: no I/O, no hidden state.

use std::fmt;

use serde_json::Value;

use fabric_api::Record;
use fabric_api::record::number_field;

pub const REQUIRED_FIELDS: [&str; 6] = ["event_id", "device_id", "timestamp", "temperature", "vibration", "status"];

pub const TEMPERATURE_MIN: f64 = 60.0;
pub const TEMPERATURE_MAX: f64 = 95.0;
/// No lower bound: negative readings pass.
pub const VIBRATION_MAX: f64 = 4.8;

/// One failed check.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    MissingField(&'static str),
    BadTimestamp(String),
    TemperatureNotNumeric(String),
    TemperatureOutOfRange(f64),
    VibrationNotNumeric(String),
    VibrationTooHigh(f64),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingField(name) => write!(f, "missing field '{name}'"),
            Violation::BadTimestamp(v) => write!(f, "timestamp is not a timezone-aware ISO 8601 instant: {v}"),
            Violation::TemperatureNotNumeric(v) => write!(f, "temperature must be numeric, got {v}"),
            Violation::TemperatureOutOfRange(v) => {
                write!(f, "temperature out of range [{TEMPERATURE_MIN}, {TEMPERATURE_MAX}]: {v}")
            }
            Violation::VibrationNotNumeric(v) => write!(f, "vibration must be numeric, got {v}"),
            Violation::VibrationTooHigh(v) => write!(f, "vibration above {VIBRATION_MAX}: {v}"),
        }
    }
}

/// Every check that `record` fails. Empty means valid.
pub fn check(record: &Record) -> Vec<Violation> {
    let mut out: Vec<Violation> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|name| record.get(*name).is_none())
        .map(Violation::MissingField)
        .collect();

    if let Some(ts) = record.get("timestamp") {
        let ok = ts.as_str().is_some_and(|s| fabric_api::parse_timestamp(s).is_some());
        if !ok {
            out.push(Violation::BadTimestamp(ts.to_string()));
        }
    }

    if let Some(raw) = record.get("temperature") {
        match number_field(record, "temperature") {
            None => out.push(Violation::TemperatureNotNumeric(raw.to_string())),
            Some(t) if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&t) => {
                out.push(Violation::TemperatureOutOfRange(t))
            }
            Some(_) => {}
        }
    }

    if let Some(raw) = record.get("vibration") {
        match number_field(record, "vibration") {
            None => out.push(Violation::VibrationNotNumeric(raw.to_string())),
            Some(v) if v > VIBRATION_MAX => out.push(Violation::VibrationTooHigh(v)),
            Some(_) => {}
        }
    }

    out
}

/// `true` when `record` passes every check. Reasons are logged at `warn`
/// against the record's position `idx` in its batch.
pub fn validate(idx: usize, record: &Record) -> bool {
    let violations = check(record);
    for v in &violations {
        tracing::warn!(record = idx, reason = %v, "invalid record");
    }
    violations.is_empty()
}

/// Result of cleansing one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cleansed {
    pub valid: Vec<Record>,
    /// `(index in batch, record, reasons)`.
    pub invalid: Vec<(usize, Record, Vec<Violation>)>,
}

/// Split a batch into valid and invalid records. Order is preserved, and
/// every rejected record is logged through [`validate`].
pub fn cleanse(batch: &[Record]) -> Cleansed {
    let mut out = Cleansed::default();
    for (idx, record) in batch.iter().enumerate() {
        if validate(idx, record) {
            out.valid.push(record.clone());
        } else {
            out.invalid.push((idx, record.clone(), check(record)));
        }
    }
    out
}

/// A broker payload as a record. Non-object payloads become an empty
/// record, which fails every required-field check.
pub fn as_record(value: &Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}
