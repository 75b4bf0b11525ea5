/// A telemetry record: named fields mapped to scalar JSON values.
///
/// Records cross the broker as UTF-8 JSON objects and are coerced to a
/// typed [`Row`](crate::catalog::Row) only when they reach a table.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Numeric view of a field, accepting JSON numbers and numeric strings.
///
/// Non-finite results are rejected.
pub fn number_field(record: &Record, name: &str) -> Option<f64> {
    let v = match record.get(name)? {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// String view of a field.
pub fn str_field<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record.get(name)?.as_str()
}
