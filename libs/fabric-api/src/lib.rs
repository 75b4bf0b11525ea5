pub mod broker;
pub mod catalog;
pub mod error;
pub mod outcome;
pub mod record;
pub mod schema;
pub mod util;

pub use broker::{BrokerRecord, MessageBroker, SessionId, TopicInfo};
pub use catalog::{Row, Snapshot, TableCatalog, TableIdent, TableMetadata};
pub use error::{ErrorKind, FabricError};
pub use outcome::Outcome;
pub use record::Record;
pub use schema::{Datum, Field, FieldType, TableSchema};
pub use util::{format_ts_ms, format_ts_us, now_ms, parse_timestamp, parse_timestamp_lenient};
