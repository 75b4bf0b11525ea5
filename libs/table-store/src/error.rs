use fabric_api::{ErrorKind, FabricError};

/// Failures raised by the in-memory catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("namespace '{0}' does not exist")]
    NamespaceNotFound(String),

    #[error("namespace '{0}' already exists")]
    NamespaceExists(String),

    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("metadata files for table '{ident}' are missing at {location}")]
    MetadataMissing { ident: String, location: String },

    #[error("catalog service unavailable")]
    Unavailable,

    #[error("column '{column}': {reason}")]
    Coercion { column: String, reason: String },
}

impl CatalogError {
    pub fn into_fabric_error(self) -> FabricError {
        let kind = match &self {
            CatalogError::NamespaceNotFound(_) | CatalogError::TableNotFound(_) => ErrorKind::NotFound,
            CatalogError::NamespaceExists(_) | CatalogError::TableExists(_) => ErrorKind::AlreadyExists,
            CatalogError::MetadataMissing { .. } => ErrorKind::MetadataMissing,
            CatalogError::Unavailable => ErrorKind::Connectivity,
            CatalogError::Coercion { .. } => ErrorKind::Format,
        };
        FabricError::new(kind, self.to_string())
    }
}

impl From<CatalogError> for FabricError {
    fn from(e: CatalogError) -> Self {
        e.into_fabric_error()
    }
}
