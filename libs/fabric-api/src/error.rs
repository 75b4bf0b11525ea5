use std::fmt;

/// Category of a fabric error. Lets callers decide between retrying,
/// repairing, or failing fast without inspecting the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credentials, bad catalog headers, unusable settings.
    /// Permanent: surfaced to the immediate caller, never retried.
    Config,
    /// Broker or storage unreachable, server-side failure. Transient.
    Connectivity,
    /// Payload or value that does not fit the expected shape.
    Format,
    /// Topic, namespace or table does not exist.
    NotFound,
    /// Create of something that is already there.
    AlreadyExists,
    /// Catalog entry exists but its backing metadata files are gone.
    MetadataMissing,
    /// Invalid state or anything not covered above.
    Logic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Connectivity => f.write_str("connectivity"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::NotFound => f.write_str("not_found"),
            ErrorKind::AlreadyExists => f.write_str("already_exists"),
            ErrorKind::MetadataMissing => f.write_str("metadata_missing"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

/// Error returned by every broker and catalog trait method.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
#[derive(Clone, PartialEq, Eq)]
pub struct FabricError {
    kind: ErrorKind,
    message: String,
}

impl FabricError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connectivity, msg)
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, msg)
    }

    pub fn metadata_missing(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::MetadataMissing, msg)
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Logic, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Transient errors are the only ones worth retrying.
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Connectivity
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Debug for FabricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl fmt::Display for FabricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FabricError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → FabricError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::io::Error> for FabricError {
    fn from(e: std::io::Error) -> Self {
        Self::connectivity(e.to_string())
    }
}

impl From<serde_json::Error> for FabricError {
    fn from(e: serde_json::Error) -> Self {
        Self::format(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_is_transient() {
        assert!(FabricError::connectivity("reset").is_transient());
        assert!(!FabricError::config("no key").is_transient());
        assert!(!FabricError::not_found("t").is_transient());
        assert!(!FabricError::metadata_missing("m").is_transient());
    }

    #[test]
    fn with_context_keeps_kind() {
        let err = FabricError::not_found("table x").with_context("load");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "load: table x");
        assert_eq!(format!("{err:?}"), "[not_found] load: table x");
    }

    #[test]
    fn io_errors_map_to_connectivity() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: FabricError = io.into();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }
}
