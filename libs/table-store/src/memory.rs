use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use fabric_api::{FabricError, Row, Snapshot, TableCatalog, TableIdent, TableMetadata, TableSchema, now_ms};

use crate::error::CatalogError;

// ═══════════════════════════════════════════════════════════════
//  Stored state
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTable {
    metadata: TableMetadata,
    rows: Vec<Row>,
    /// `false` once the metadata files behind the catalog entry are gone.
    #[serde(default = "default_true")]
    metadata_present: bool,
}

fn default_true() -> bool {
    true
}

/// Durable catalog state: namespaces, tables and their rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    namespaces: BTreeMap<String, BTreeMap<String, StoredTable>>,
    next_snapshot_id: i64,
}

impl CatalogSnapshot {
    fn table(&self, ident: &TableIdent) -> Result<&StoredTable, CatalogError> {
        self.namespaces
            .get(&ident.namespace)
            .and_then(|tables| tables.get(&ident.name))
            .ok_or_else(|| CatalogError::TableNotFound(ident.to_string()))
    }

    fn table_mut(&mut self, ident: &TableIdent) -> Result<&mut StoredTable, CatalogError> {
        self.namespaces
            .get_mut(&ident.namespace)
            .and_then(|tables| tables.get_mut(&ident.name))
            .ok_or_else(|| CatalogError::TableNotFound(ident.to_string()))
    }
}

impl StoredTable {
    fn readable(&self) -> Result<&Self, CatalogError> {
        if self.metadata_present {
            Ok(self)
        } else {
            Err(CatalogError::MetadataMissing {
                ident: self.metadata.ident.to_string(),
                location: self.metadata.location.clone(),
            })
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryCatalog
// ═══════════════════════════════════════════════════════════════

/// In-process table catalog with snapshot-per-append semantics.
///
/// Fault hooks: `set_available`, `inject_failures`, `corrupt_metadata`.
pub struct MemoryCatalog {
    state: RwLock<CatalogSnapshot>,
    available: AtomicBool,
    injected: Mutex<VecDeque<FabricError>>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::from_snapshot(CatalogSnapshot::default())
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            available: AtomicBool::new(true),
            injected: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.state.read().await.clone()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The next `count` catalog calls fail with `err`.
    pub fn inject_failures(&self, count: usize, err: FabricError) {
        let mut queue = self.injected.lock().unwrap_or_else(|e| e.into_inner());
        queue.extend(std::iter::repeat_n(err, count));
    }

    /// Delete the metadata files behind a table while keeping its catalog entry.
    pub async fn corrupt_metadata(&self, ident: &TableIdent) -> Result<(), FabricError> {
        let mut state = self.state.write().await;
        state.table_mut(ident)?.metadata_present = false;
        Ok(())
    }

    fn check(&self) -> Result<(), FabricError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable.into());
        }
        let mut queue = self.injected.lock().unwrap_or_else(|e| e.into_inner());
        match queue.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl TableCatalog for MemoryCatalog {
    fn create_namespace(&self, namespace: &str) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let namespace = namespace.to_string();
        Box::pin(async move {
            self.check()?;
            let mut state = self.state.write().await;
            if state.namespaces.contains_key(&namespace) {
                return Err(CatalogError::NamespaceExists(namespace).into());
            }
            state.namespaces.insert(namespace, BTreeMap::new());
            Ok(())
        })
    }

    fn list_namespaces(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, FabricError>> + Send + '_>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.state.read().await.namespaces.keys().cloned().collect())
        })
    }

    fn list_tables(
        &self,
        namespace: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TableIdent>, FabricError>> + Send + '_>> {
        let namespace = namespace.to_string();
        Box::pin(async move {
            self.check()?;
            let state = self.state.read().await;
            let tables = state
                .namespaces
                .get(&namespace)
                .ok_or_else(|| CatalogError::NamespaceNotFound(namespace.clone()))?;
            Ok(tables.keys().map(|name| TableIdent::new(namespace.clone(), name.clone())).collect())
        })
    }

    fn load_table(
        &self,
        ident: &TableIdent,
    ) -> Pin<Box<dyn Future<Output = Result<TableMetadata, FabricError>> + Send + '_>> {
        let ident = ident.clone();
        Box::pin(async move {
            self.check()?;
            let state = self.state.read().await;
            Ok(state.table(&ident)?.readable()?.metadata.clone())
        })
    }

    fn create_table(
        &self,
        ident: &TableIdent,
        schema: TableSchema,
        location: &str,
    ) -> Pin<Box<dyn Future<Output = Result<TableMetadata, FabricError>> + Send + '_>> {
        let ident = ident.clone();
        let location = location.to_string();
        Box::pin(async move {
            self.check()?;
            let mut state = self.state.write().await;
            let tables = state
                .namespaces
                .get_mut(&ident.namespace)
                .ok_or_else(|| CatalogError::NamespaceNotFound(ident.namespace.clone()))?;
            if tables.contains_key(&ident.name) {
                return Err(CatalogError::TableExists(ident.to_string()).into());
            }
            let metadata = TableMetadata { ident: ident.clone(), location, schema, snapshots: Vec::new() };
            tables.insert(
                ident.name.clone(),
                StoredTable { metadata: metadata.clone(), rows: Vec::new(), metadata_present: true },
            );
            tracing::debug!(table = %ident, location = %metadata.location, "table registered");
            Ok(metadata)
        })
    }

    fn drop_table(&self, ident: &TableIdent) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let ident = ident.clone();
        Box::pin(async move {
            self.check()?;
            let mut state = self.state.write().await;
            state
                .namespaces
                .get_mut(&ident.namespace)
                .and_then(|tables| tables.remove(&ident.name))
                .map(|_| ())
                .ok_or_else(|| FabricError::from(CatalogError::TableNotFound(ident.to_string())))
        })
    }

    fn append(
        &self,
        ident: &TableIdent,
        rows: Vec<Row>,
    ) -> Pin<Box<dyn Future<Output = Result<Snapshot, FabricError>> + Send + '_>> {
        let ident = ident.clone();
        Box::pin(async move {
            self.check()?;
            let mut state = self.state.write().await;
            state.next_snapshot_id += 1;
            let snapshot_id = state.next_snapshot_id;
            let table = state.table_mut(&ident)?;
            table.readable()?;
            let width = table.metadata.schema.fields.len();
            if let Some(bad) = rows.iter().find(|r| r.values.len() != width) {
                return Err(FabricError::format(format!(
                    "row has {} values, table '{ident}' has {width} columns",
                    bad.values.len()
                )));
            }
            let added = rows.len() as u64;
            table.rows.extend(rows);
            let snapshot = Snapshot {
                snapshot_id,
                timestamp_ms: now_ms(),
                added_records: added,
                total_records: table.rows.len() as u64,
            };
            table.metadata.snapshots.push(snapshot.clone());
            Ok(snapshot)
        })
    }

    fn scan(&self, ident: &TableIdent) -> Pin<Box<dyn Future<Output = Result<Vec<Row>, FabricError>> + Send + '_>> {
        let ident = ident.clone();
        Box::pin(async move {
            self.check()?;
            let state = self.state.read().await;
            Ok(state.table(&ident)?.readable()?.rows.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_api::{Datum, ErrorKind, Field, FieldType};

    fn schema() -> TableSchema {
        TableSchema::new(vec![Field::required(1, "id", FieldType::String)])
    }

    fn row(id: &str) -> Row {
        Row { values: vec![Some(Datum::String(id.to_string()))] }
    }

    async fn with_table() -> (MemoryCatalog, TableIdent) {
        let catalog = MemoryCatalog::new();
        let ident = TableIdent::new("ns", "t");
        catalog.create_namespace("ns").await.unwrap();
        catalog.create_table(&ident, schema(), "s3://b/iceberg/ns/t/").await.unwrap();
        (catalog, ident)
    }

    #[tokio::test]
    async fn namespace_must_exist_before_table() {
        let catalog = MemoryCatalog::new();
        let err = catalog
            .create_table(&TableIdent::new("nope", "t"), schema(), "s3://b/x/")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        catalog.create_namespace("ns").await.unwrap();
        assert_eq!(catalog.create_namespace("ns").await.unwrap_err().kind(), ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn each_append_is_a_snapshot() {
        let (catalog, ident) = with_table().await;
        let s1 = catalog.append(&ident, vec![row("a"), row("b")]).await.unwrap();
        let s2 = catalog.append(&ident, vec![row("c")]).await.unwrap();
        assert!(s2.snapshot_id > s1.snapshot_id);
        assert_eq!(s2.total_records, 3);
        let meta = catalog.load_table(&ident).await.unwrap();
        assert_eq!(meta.snapshots.len(), 2);
        assert_eq!(meta.current_snapshot().unwrap().added_records, 1);
        assert_eq!(catalog.scan(&ident).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rejects_rows_of_wrong_width() {
        let (catalog, ident) = with_table().await;
        let err = catalog.append(&ident, vec![Row { values: vec![] }]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn corrupted_metadata_blocks_reads_but_not_drop() {
        let (catalog, ident) = with_table().await;
        catalog.corrupt_metadata(&ident).await.unwrap();
        assert_eq!(catalog.load_table(&ident).await.unwrap_err().kind(), ErrorKind::MetadataMissing);
        assert_eq!(catalog.scan(&ident).await.unwrap_err().kind(), ErrorKind::MetadataMissing);
        catalog.drop_table(&ident).await.unwrap();
        assert_eq!(catalog.load_table(&ident).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let (catalog, ident) = with_table().await;
        catalog.inject_failures(2, FabricError::connectivity("503"));
        assert!(catalog.load_table(&ident).await.is_err());
        assert!(catalog.load_table(&ident).await.is_err());
        assert!(catalog.load_table(&ident).await.is_ok());
    }

    #[tokio::test]
    async fn snapshot_roundtrip_keeps_rows() {
        let (catalog, ident) = with_table().await;
        catalog.append(&ident, vec![row("a")]).await.unwrap();
        let json = serde_json::to_string(&catalog.snapshot().await).unwrap();
        let restored = MemoryCatalog::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.scan(&ident).await.unwrap(), vec![row("a")]);
    }
}
