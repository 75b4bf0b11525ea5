use fabric_api::{Field, FieldType, TableSchema};

/// Silver layer: one row per validated sensor event.
pub fn cleansed_schema() -> TableSchema {
    TableSchema::new(vec![
        Field::required(1, "event_id", FieldType::String),
        Field::required(2, "device_id", FieldType::String),
        Field::required(3, "timestamp", FieldType::Timestamp),
        Field::required(4, "temperature", FieldType::Float),
        Field::required(5, "vibration", FieldType::Float),
        Field::required(6, "status", FieldType::String),
    ])
}

/// Gold layer: one row per pipeline run.
pub fn kpis_schema() -> TableSchema {
    TableSchema::new(vec![
        Field::required(1, "window_start", FieldType::Timestamp),
        Field::required(2, "window_end", FieldType::Timestamp),
        Field::required(3, "total_events", FieldType::Long),
        Field::required(4, "avg_temp", FieldType::Float),
        Field::required(5, "anomaly_count", FieldType::Int),
    ])
}
