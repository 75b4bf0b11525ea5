pub mod coerce;
pub mod credentials;
pub mod error;
pub mod memory;
pub mod provisioner;
pub mod retry;
pub mod store;

pub use coerce::{record_to_row, row_to_record};
pub use credentials::{CredentialSource, StaticCredentials};
pub use error::CatalogError;
pub use memory::{CatalogSnapshot, MemoryCatalog};
pub use provisioner::{TableProvisioner, expected_location};
pub use retry::RetryPolicy;
pub use store::{TableHandle, TableMetrics, TableStore, TableSummary};
