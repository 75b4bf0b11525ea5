use std::fmt;

/// Result of an idempotent create-or-repair operation.
///
/// Callers match exhaustively instead of probing optional keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    /// Already present and correct; nothing done.
    Skipped,
    /// Present but misconfigured; dropped and recreated.
    Repaired,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    /// `success` / `error`, as reported to users.
    pub fn status(&self) -> &'static str {
        if self.is_success() { "success" } else { "error" }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Skipped => "skipped",
            Outcome::Repaired => "repaired",
            Outcome::Failed(_) => "failed",
        }
    }

    /// Visual marker used in narrated logs.
    pub fn marker(&self) -> &'static str {
        match self {
            Outcome::Created => "✓",
            Outcome::Skipped => "→",
            Outcome::Repaired => "⟳",
            Outcome::Failed(_) => "✕",
        }
    }

    /// One narrated log line for `what` (e.g. "Table telemetry.cleansed").
    pub fn describe(&self, what: &str) -> String {
        match self {
            Outcome::Created => format!("✓ {what} created successfully"),
            Outcome::Skipped => format!("→ {what} already exists, skipping"),
            Outcome::Repaired => format!("⟳ {what} was misconfigured and has been recreated"),
            Outcome::Failed(reason) => format!("✕ Failed to create {what}: {reason}"),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.name()),
        }
    }
}

impl serde::Serialize for Outcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Outcome", 3)?;
        s.serialize_field("status", self.status())?;
        s.serialize_field("outcome", self.name())?;
        match self {
            Outcome::Failed(reason) => s.serialize_field("message", reason)?,
            _ => s.serialize_field("message", &None::<String>)?,
        }
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_is_error_status() {
        assert_eq!(Outcome::Failed("boom".into()).status(), "error");
        assert_eq!(Outcome::Repaired.status(), "success");
        assert_eq!(Outcome::Skipped.marker(), "→");
    }

    #[test]
    fn serializes_structured_result() {
        let v = serde_json::to_value(Outcome::Failed("unreachable".into())).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["outcome"], "failed");
        assert_eq!(v["message"], "unreachable");
    }
}
