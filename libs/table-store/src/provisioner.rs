use fabric_api::{ErrorKind, FabricError, Outcome, TableIdent, TableSchema};

use crate::store::TableStore;

/// Deterministic storage path of a table: `{root}/{namespace}/{name}/`.
pub fn expected_location(root: &str, ident: &TableIdent) -> String {
    format!("{}/{}/{}/", root.trim_end_matches('/'), ident.namespace, ident.name)
}

fn same_location(actual: &str, expected: &str) -> bool {
    actual.trim_end_matches('/') == expected.trim_end_matches('/')
}

/// Idempotent create-or-repair of tables on top of a [`TableStore`].
///
/// A table registered under a different storage root, or whose metadata
/// files are gone, is dropped from the catalog and recreated at the
/// expected location.
#[derive(Clone)]
pub struct TableProvisioner {
    store: TableStore,
}

impl TableProvisioner {
    pub fn new(store: TableStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub async fn ensure_table(&self, ident: &TableIdent, root: &str, schema: &TableSchema) -> Outcome {
        match self.try_ensure(ident, root, schema).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(table = %ident, error = %e, "table provisioning failed");
                Outcome::Failed(e.to_string())
            }
        }
    }

    async fn try_ensure(&self, ident: &TableIdent, root: &str, schema: &TableSchema) -> Result<Outcome, FabricError> {
        let expected = expected_location(root, ident);
        self.store.ensure_namespace(&ident.namespace).await?;

        match self.store.load_table(ident).await {
            Ok(existing) if same_location(existing.location(), &expected) => {
                tracing::debug!(table = %ident, location = %expected, "table already provisioned");
                Ok(Outcome::Skipped)
            }
            Ok(existing) => {
                tracing::warn!(
                    table = %ident,
                    actual = %existing.location(),
                    expected = %expected,
                    "table registered at wrong location, recreating"
                );
                self.recreate(ident, schema, &expected).await
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.store.create_table(ident, schema, &expected).await?;
                Ok(Outcome::Created)
            }
            Err(e) if e.kind() == ErrorKind::MetadataMissing => {
                tracing::warn!(table = %ident, error = %e, "table metadata missing, recreating");
                self.recreate(ident, schema, &expected).await
            }
            Err(e) => Err(e),
        }
    }

    async fn recreate(&self, ident: &TableIdent, schema: &TableSchema, location: &str) -> Result<Outcome, FabricError> {
        match self.store.drop_table(ident).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.with_context("drop before recreate")),
        }
        self.store.create_table(ident, schema, location).await?;
        Ok(Outcome::Repaired)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::memory::MemoryCatalog;
    use crate::retry::RetryPolicy;
    use fabric_api::{Field, FieldType, TableCatalog};

    const ROOT: &str = "s3://silver-bucket/iceberg";

    fn schema() -> TableSchema {
        TableSchema::new(vec![Field::required(1, "event_id", FieldType::String)])
    }

    fn provisioner(catalog: Arc<MemoryCatalog>) -> TableProvisioner {
        TableProvisioner::new(TableStore::new(
            catalog,
            Arc::new(StaticCredentials::new("ak", "sk")),
            RetryPolicy::new(2, Duration::from_millis(1)),
        ))
    }

    #[test]
    fn location_is_root_namespace_name() {
        let ident = TableIdent::new("telemetry", "cleansed");
        assert_eq!(expected_location(ROOT, &ident), "s3://silver-bucket/iceberg/telemetry/cleansed/");
        assert_eq!(expected_location("s3://x/", &ident), "s3://x/telemetry/cleansed/");
        assert!(same_location("s3://x/telemetry/cleansed", "s3://x/telemetry/cleansed/"));
    }

    #[tokio::test]
    async fn second_call_is_skipped() {
        let p = provisioner(Arc::new(MemoryCatalog::new()));
        let ident = TableIdent::new("telemetry", "cleansed");
        assert_eq!(p.ensure_table(&ident, ROOT, &schema()).await, Outcome::Created);
        assert_eq!(p.ensure_table(&ident, ROOT, &schema()).await, Outcome::Skipped);
    }

    #[tokio::test]
    async fn wrong_location_is_repaired() {
        let catalog = Arc::new(MemoryCatalog::new());
        let ident = TableIdent::new("telemetry", "cleansed");
        catalog.create_namespace("telemetry").await.unwrap();
        catalog
            .create_table(&ident, schema(), "s3://old-bucket/iceberg/telemetry/cleansed/")
            .await
            .unwrap();

        let p = provisioner(catalog.clone());
        assert_eq!(p.ensure_table(&ident, ROOT, &schema()).await, Outcome::Repaired);
        let meta = catalog.load_table(&ident).await.unwrap();
        assert_eq!(meta.location, "s3://silver-bucket/iceberg/telemetry/cleansed/");
        assert_eq!(p.ensure_table(&ident, ROOT, &schema()).await, Outcome::Skipped);
    }

    #[tokio::test]
    async fn missing_metadata_is_repaired() {
        let catalog = Arc::new(MemoryCatalog::new());
        let p = provisioner(catalog.clone());
        let ident = TableIdent::new("telemetry", "cleansed");
        p.ensure_table(&ident, ROOT, &schema()).await;
        catalog.corrupt_metadata(&ident).await.unwrap();

        assert_eq!(p.ensure_table(&ident, ROOT, &schema()).await, Outcome::Repaired);
        assert!(catalog.load_table(&ident).await.is_ok());
    }

    #[tokio::test]
    async fn connectivity_failure_is_reported_as_failed() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.set_available(false);
        let p = provisioner(catalog);
        let outcome = p.ensure_table(&TableIdent::new("ns", "t"), ROOT, &schema()).await;
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert_eq!(outcome.status(), "error");
    }
}
