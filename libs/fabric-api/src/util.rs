use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Parse a timezone-aware ISO-8601 instant (`2026-03-01T10:00:00.123+00:00`, `...Z`).
///
/// Naive timestamps are rejected: an instant without an offset is ambiguous.
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s.trim()).ok()
}

/// Like [`parse_timestamp`] but also accepts naive `YYYY-MM-DDTHH:MM:SS[.f]`,
/// interpreted as UTC. Used when normalizing values on their way into a table.
pub fn parse_timestamp_lenient(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Some(dt) = parse_timestamp(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Unix ms → RFC 3339 string in UTC (`2026-03-01T10:00:00.123+00:00`).
pub fn format_ts_ms(ms: i64) -> Option<String> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, false))
}

/// Unix µs → RFC 3339 string in UTC with microsecond precision.
pub fn format_ts_us(us: i64) -> Option<String> {
    Utc.timestamp_micros(us)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Micros, false))
}
