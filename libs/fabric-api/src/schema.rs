use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Field Type
// ════════════════════════════════════════════════════════════════

/// Column types of the columnar table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    Double,
    /// Microseconds from epoch, UTC.
    Timestamp,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "string"),
            FieldType::Int => write!(f, "int"),
            FieldType::Long => write!(f, "long"),
            FieldType::Float => write!(f, "float"),
            FieldType::Double => write!(f, "double"),
            FieldType::Timestamp => write!(f, "timestamp"),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Field & TableSchema
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: u32,
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
}

impl Field {
    /// Shortcut: required field.
    pub fn required(id: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self { id, name: name.into(), field_type, required: true }
    }

    /// Shortcut: optional field.
    pub fn optional(id: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self { id, name: name.into(), field_type, required: false }
    }
}

/// Ordered list of named, typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<Field>,
}

impl TableSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Index of the first timestamp column, used for most-recent-first ordering.
    pub fn time_column(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.field_type == FieldType::Timestamp)
    }

    /// `event_id: string!, temperature: float!, ...`; `!` marks required.
    pub fn summary(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}: {}{}", f.name, f.field_type, if f.required { "!" } else { "" }))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ════════════════════════════════════════════════════════════════
//  Datum
// ════════════════════════════════════════════════════════════════

/// A single typed cell value, already normalized to its column type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Datum {
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Microseconds from epoch.
    Timestamp(i64),
}

impl Datum {
    /// Sort key for timestamp columns.
    pub fn as_timestamp_us(&self) -> Option<i64> {
        match self {
            Datum::Timestamp(us) => Some(*us),
            _ => None,
        }
    }

    /// JSON rendering; timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Datum::String(s) => serde_json::Value::String(s.clone()),
            Datum::Int(v) => serde_json::Value::from(*v),
            Datum::Long(v) => serde_json::Value::from(*v),
            Datum::Float(v) => serde_json::Value::from(*v as f64),
            Datum::Double(v) => serde_json::Value::from(*v),
            Datum::Timestamp(us) => crate::util::format_ts_us(*us)
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_marks_required() {
        let schema = TableSchema::new(vec![
            Field::required(1, "event_id", FieldType::String),
            Field::optional(2, "note", FieldType::String),
        ]);
        assert_eq!(schema.summary(), "event_id: string!, note: string");
    }

    #[test]
    fn time_column_is_first_timestamp() {
        let schema = TableSchema::new(vec![
            Field::required(1, "id", FieldType::String),
            Field::required(2, "window_start", FieldType::Timestamp),
            Field::required(3, "window_end", FieldType::Timestamp),
        ]);
        assert_eq!(schema.time_column(), Some(1));
    }
}
