use std::sync::Arc;

use serde::Serialize;

use fabric_api::{
    ErrorKind, FabricError, Record, Row, Snapshot, TableCatalog, TableIdent, TableMetadata, TableSchema,
    format_ts_ms,
};

use crate::coerce::{record_to_row, row_to_record};
use crate::credentials::CredentialSource;
use crate::retry::RetryPolicy;

// ═══════════════════════════════════════════════════════════════
//  Handles & reports
// ═══════════════════════════════════════════════════════════════

/// A loaded table. Holds the metadata as of the load.
#[derive(Debug, Clone, PartialEq)]
pub struct TableHandle {
    metadata: TableMetadata,
}

impl TableHandle {
    pub fn ident(&self) -> &TableIdent {
        &self.metadata.ident
    }

    pub fn location(&self) -> &str {
        &self.metadata.location
    }

    pub fn schema(&self) -> &TableSchema {
        &self.metadata.schema
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMetrics {
    pub table: String,
    pub location: String,
    pub record_count: u64,
    pub snapshot_count: usize,
    pub current_snapshot_id: Option<i64>,
    pub last_updated: Option<String>,
}

/// Catalog listing entry. Location and schema are absent when the table
/// could not be loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub namespace: String,
    pub location: Option<String>,
    pub schema: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  TableStore
// ═══════════════════════════════════════════════════════════════

/// Table lifecycle client over a `TableCatalog`.
///
/// Credentials are checked before every operation. Catalog calls go through
/// the retry policy, so transient failures are retried and everything else
/// propagates at once. `scan` and `list_tables` never fail: errors are logged
/// and an empty result comes back.
#[derive(Clone)]
pub struct TableStore {
    catalog: Arc<dyn TableCatalog>,
    credentials: Arc<dyn CredentialSource>,
    retry: RetryPolicy,
}

impl TableStore {
    pub fn new(catalog: Arc<dyn TableCatalog>, credentials: Arc<dyn CredentialSource>, retry: RetryPolicy) -> Self {
        Self { catalog, credentials, retry }
    }

    /// Create the namespace if missing. An existing namespace is success.
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<(), FabricError> {
        self.credentials.ensure_valid().await?;
        match self.retry.run("create_namespace", || self.catalog.create_namespace(namespace)).await {
            Ok(()) => {
                tracing::info!(namespace = %namespace, "namespace created");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.with_context(format!("namespace '{namespace}'"))),
        }
    }

    /// `NotFound` when the table does not exist.
    pub async fn load_table(&self, ident: &TableIdent) -> Result<TableHandle, FabricError> {
        self.credentials.ensure_valid().await?;
        let metadata = self.retry.run("load_table", || self.catalog.load_table(ident)).await?;
        Ok(TableHandle { metadata })
    }

    pub async fn create_table(
        &self,
        ident: &TableIdent,
        schema: &TableSchema,
        location: &str,
    ) -> Result<TableHandle, FabricError> {
        self.credentials.ensure_valid().await?;
        let metadata = self
            .retry
            .run("create_table", || self.catalog.create_table(ident, schema.clone(), location))
            .await?;
        tracing::info!(table = %ident, location = %location, "table created");
        Ok(TableHandle { metadata })
    }

    pub async fn drop_table(&self, ident: &TableIdent) -> Result<(), FabricError> {
        self.credentials.ensure_valid().await?;
        self.retry.run("drop_table", || self.catalog.drop_table(ident)).await
    }

    /// Coerce `records` to the table schema and append them as one snapshot.
    /// A record that cannot be coerced fails the whole append before anything
    /// is written.
    pub async fn append(&self, table: &TableHandle, records: &[Record]) -> Result<Snapshot, FabricError> {
        self.credentials.ensure_valid().await?;
        let rows = records
            .iter()
            .enumerate()
            .map(|(i, r)| record_to_row(table.schema(), r).map_err(|e| e.with_context(format!("record {i}"))))
            .collect::<Result<Vec<Row>, _>>()?;
        let snapshot = self
            .retry
            .run("append", || self.catalog.append(table.ident(), rows.clone()))
            .await?;
        tracing::info!(
            table = %table.ident(),
            snapshot_id = snapshot.snapshot_id,
            added = snapshot.added_records,
            "rows appended"
        );
        Ok(snapshot)
    }

    /// Rows of the current snapshot, newest first when the schema has a
    /// timestamp column, truncated to `limit`.
    pub async fn scan(&self, table: &TableHandle, limit: Option<usize>) -> Vec<Record> {
        match self.try_scan(table).await {
            Ok(mut rows) => {
                if let Some(col) = table.schema().time_column() {
                    let key = |r: &Row| r.values.get(col).and_then(|v| v.as_ref()).and_then(|d| d.as_timestamp_us());
                    rows.sort_by(|a, b| key(b).cmp(&key(a)));
                }
                if let Some(limit) = limit {
                    rows.truncate(limit);
                }
                rows.iter().map(|r| row_to_record(table.schema(), r)).collect()
            }
            Err(e) => {
                tracing::error!(table = %table.ident(), error = %e, "error scanning table");
                Vec::new()
            }
        }
    }

    /// Record count by full scan, falling back to the current snapshot's
    /// recorded total when the scan fails.
    pub async fn metrics(&self, table: &TableHandle) -> Result<TableMetrics, FabricError> {
        let fresh = self.load_table(table.ident()).await?;
        let current = fresh.metadata.current_snapshot();
        let record_count = match self.try_scan(&fresh).await {
            Ok(rows) => rows.len() as u64,
            Err(e) => {
                tracing::warn!(table = %fresh.ident(), error = %e, "scan failed, using snapshot summary");
                current.map_or(0, |s| s.total_records)
            }
        };
        Ok(TableMetrics {
            table: fresh.ident().to_string(),
            location: fresh.location().to_string(),
            record_count,
            snapshot_count: fresh.metadata.snapshots.len(),
            current_snapshot_id: current.map(|s| s.snapshot_id),
            last_updated: current.and_then(|s| format_ts_ms(s.timestamp_ms)),
        })
    }

    /// Every table of every namespace.
    pub async fn list_tables(&self) -> Vec<TableSummary> {
        if let Err(e) = self.credentials.ensure_valid().await {
            tracing::error!(error = %e, "cannot list tables");
            return Vec::new();
        }
        let namespaces = match self.retry.run("list_namespaces", || self.catalog.list_namespaces()).await {
            Ok(ns) => ns,
            Err(e) => {
                tracing::error!(error = %e, "error listing namespaces");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for ns in namespaces {
            let idents = match self.retry.run("list_tables", || self.catalog.list_tables(&ns)).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(namespace = %ns, error = %e, "error listing tables");
                    continue;
                }
            };
            for ident in idents {
                let summary = match self.catalog.load_table(&ident).await {
                    Ok(meta) => TableSummary {
                        name: ident.to_string(),
                        namespace: ns.clone(),
                        location: Some(meta.location.clone()),
                        schema: Some(meta.schema.summary()),
                    },
                    Err(e) => {
                        tracing::debug!(table = %ident, error = %e, "table listed without metadata");
                        TableSummary { name: ident.to_string(), namespace: ns.clone(), location: None, schema: None }
                    }
                };
                out.push(summary);
            }
        }
        out
    }

    async fn try_scan(&self, table: &TableHandle) -> Result<Vec<Row>, FabricError> {
        self.credentials.ensure_valid().await?;
        self.retry.run("scan", || self.catalog.scan(table.ident())).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::memory::MemoryCatalog;
    use fabric_api::{Field, FieldType};
    use serde_json::json;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Field::required(1, "event_id", FieldType::String),
            Field::required(2, "timestamp", FieldType::Timestamp),
        ])
    }

    fn rec(id: &str, ts: &str) -> Record {
        json!({"event_id": id, "timestamp": ts}).as_object().cloned().unwrap()
    }

    fn store(catalog: Arc<MemoryCatalog>) -> TableStore {
        TableStore::new(
            catalog,
            Arc::new(StaticCredentials::new("ak", "sk")),
            RetryPolicy::new(3, Duration::from_millis(1)),
        )
    }

    async fn table(store: &TableStore) -> TableHandle {
        let ident = TableIdent::new("telemetry", "cleansed");
        store.ensure_namespace("telemetry").await.unwrap();
        store.create_table(&ident, &schema(), "s3://silver/iceberg/telemetry/cleansed/").await.unwrap()
    }

    #[tokio::test]
    async fn ensure_namespace_is_idempotent() {
        let store = store(Arc::new(MemoryCatalog::new()));
        store.ensure_namespace("ns").await.unwrap();
        store.ensure_namespace("ns").await.unwrap();
    }

    #[tokio::test]
    async fn scan_is_newest_first_with_limit() {
        let store = store(Arc::new(MemoryCatalog::new()));
        let t = table(&store).await;
        store
            .append(&t, &[rec("a", "2026-03-01T10:00:00Z"), rec("b", "2026-03-01T10:00:02Z")])
            .await
            .unwrap();
        store.append(&t, &[rec("c", "2026-03-01T10:00:01Z")]).await.unwrap();

        let ids: Vec<String> = store
            .scan(&t, Some(2))
            .await
            .iter()
            .map(|r| r["event_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn append_fails_loudly_on_bad_record() {
        let store = store(Arc::new(MemoryCatalog::new()));
        let t = table(&store).await;
        let err = store
            .append(&t, &[rec("a", "2026-03-01T10:00:00Z"), rec("b", "later")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.message().starts_with("record 1"));
        assert!(store.scan(&t, None).await.is_empty());
    }

    #[tokio::test]
    async fn transient_append_failure_is_retried() {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = store(catalog.clone());
        let t = table(&store).await;
        catalog.inject_failures(2, FabricError::connectivity("503 from catalog"));
        let snap = store.append(&t, &[rec("a", "2026-03-01T10:00:00Z")]).await.unwrap();
        assert_eq!(snap.total_records, 1);
    }

    #[tokio::test]
    async fn metrics_count_rows_and_snapshots() {
        let store = store(Arc::new(MemoryCatalog::new()));
        let t = table(&store).await;
        store.append(&t, &[rec("a", "2026-03-01T10:00:00Z")]).await.unwrap();
        let last = store.append(&t, &[rec("b", "2026-03-01T10:00:01Z")]).await.unwrap();

        let m = store.metrics(&t).await.unwrap();
        assert_eq!(m.record_count, 2);
        assert_eq!(m.snapshot_count, 2);
        assert_eq!(m.current_snapshot_id, Some(last.snapshot_id));
        assert!(m.last_updated.is_some());
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_retry() {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = TableStore::new(catalog, Arc::new(StaticCredentials::default()), RetryPolicy::default());
        let err = store.ensure_namespace("ns").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn list_tables_degrades_per_table() {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = store(catalog.clone());
        let t = table(&store).await;
        catalog.corrupt_metadata(t.ident()).await.unwrap();

        let listed = store.list_tables().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "telemetry.cleansed");
        assert_eq!(listed[0].location, None);
    }

    #[tokio::test]
    async fn scan_of_unreachable_catalog_is_empty() {
        let catalog = Arc::new(MemoryCatalog::new());
        let store = store(catalog.clone());
        let t = table(&store).await;
        catalog.set_available(false);
        assert!(store.scan(&t, None).await.is_empty());
    }
}
