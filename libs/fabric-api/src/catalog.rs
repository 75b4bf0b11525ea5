use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::FabricError;
use crate::schema::{Datum, TableSchema};

// ════════════════════════════════════════════════════════════════
//  TableIdent
// ════════════════════════════════════════════════════════════════

/// Two-part catalog identifier `namespace.table`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableIdent {
    pub namespace: String,
    pub name: String,
}

impl TableIdent {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// Accepts `namespace.table` and `bucket.namespace.table`.
    /// The bucket qualifier is not part of the catalog identifier and is dropped.
    pub fn parse(s: &str) -> Result<Self, FabricError> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [ns, name] | [_, ns, name] if !ns.is_empty() && !name.is_empty() => {
                Ok(Self::new(*ns, *name))
            }
            _ => Err(FabricError::config(format!(
                "invalid table identifier '{s}': use namespace.table or bucket.namespace.table"
            ))),
        }
    }
}

impl std::fmt::Display for TableIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

// ════════════════════════════════════════════════════════════════
//  Snapshot & TableMetadata
// ════════════════════════════════════════════════════════════════

/// Immutable state of a table after one append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: i64,
    pub timestamp_ms: i64,
    pub added_records: u64,
    pub total_records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub ident: TableIdent,
    /// Backing storage path, e.g. `s3://silver-bucket/iceberg/telemetry/cleansed/`.
    pub location: String,
    pub schema: TableSchema,
    /// Oldest first.
    pub snapshots: Vec<Snapshot>,
}

impl TableMetadata {
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }
}

/// One row, values aligned with the table schema's field order.
/// `None` is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Option<Datum>>,
}

// ════════════════════════════════════════════════════════════════
//  TableCatalog
// ════════════════════════════════════════════════════════════════

/// Catalog and data plane of the versioned table store.
///
/// Rows handed to `append` are already coerced to the table schema.
pub trait TableCatalog: Send + Sync {
    /// `AlreadyExists` if the namespace is there.
    fn create_namespace(&self, namespace: &str) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>>;

    fn list_namespaces(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, FabricError>> + Send + '_>>;

    fn list_tables(
        &self,
        namespace: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TableIdent>, FabricError>> + Send + '_>>;

    /// `NotFound` if absent, `MetadataMissing` if registered but unreadable.
    fn load_table(
        &self,
        ident: &TableIdent,
    ) -> Pin<Box<dyn Future<Output = Result<TableMetadata, FabricError>> + Send + '_>>;

    /// `NotFound` if the namespace is missing, `AlreadyExists` if the table is there.
    fn create_table(
        &self,
        ident: &TableIdent,
        schema: TableSchema,
        location: &str,
    ) -> Pin<Box<dyn Future<Output = Result<TableMetadata, FabricError>> + Send + '_>>;

    /// Remove the catalog entry only. Data files are left as they are.
    fn drop_table(&self, ident: &TableIdent) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>>;

    /// Append rows as one new snapshot.
    fn append(
        &self,
        ident: &TableIdent,
        rows: Vec<Row>,
    ) -> Pin<Box<dyn Future<Output = Result<Snapshot, FabricError>> + Send + '_>>;

    /// All rows of the current snapshot, in append order.
    fn scan(&self, ident: &TableIdent) -> Pin<Box<dyn Future<Output = Result<Vec<Row>, FabricError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_bucket() {
        let ident = TableIdent::parse("silver-bucket.telemetry.cleansed").unwrap();
        assert_eq!(ident, TableIdent::new("telemetry", "cleansed"));
        assert_eq!(TableIdent::parse("manufacturing.kpis").unwrap().to_string(), "manufacturing.kpis");
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(TableIdent::parse("kpis").is_err());
        assert!(TableIdent::parse("a.b.c.d").is_err());
        assert!(TableIdent::parse("ns.").is_err());
    }
}
