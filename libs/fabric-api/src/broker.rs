use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::FabricError;

// ════════════════════════════════════════════════════════════════
//  Broker types
// ════════════════════════════════════════════════════════════════

/// Identifier of a short-lived read session opened against the broker.
pub type SessionId = u64;

/// One entry of a partition log, as returned by a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerRecord {
    pub partition: u32,
    pub offset: u64,
    /// Append time, Unix ms.
    pub timestamp_ms: i64,
    /// UTF-8 JSON bytes.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub name: String,
    pub partitions: u32,
}

// ════════════════════════════════════════════════════════════════
//  MessageBroker
// ════════════════════════════════════════════════════════════════

/// Partitioned append-only log with consumer-group offset tracking.
///
/// The broker owns partition choice, retention and the durable committed
/// offset of every consumer group. Clients only read offsets, fetch from
/// an explicit position and commit what they have read.
///
/// Offsets: `beginning` is the oldest retained entry, `end` the next one
/// to be written. A fetch below `beginning` starts at `beginning`.
pub trait MessageBroker: Send + Sync {
    /// Create a topic. `AlreadyExists` if it is already there.
    fn create_topic(
        &self,
        topic: &str,
        partitions: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>>;

    fn list_topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<TopicInfo>, FabricError>> + Send + '_>>;

    /// Partition ids of a topic. Empty for an unknown topic.
    fn partitions(&self, topic: &str) -> Pin<Box<dyn Future<Output = Result<Vec<u32>, FabricError>> + Send + '_>>;

    /// Append one payload. The broker picks the partition.
    /// Returns `(partition, offset)` of the written entry.
    fn send(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(u32, u64), FabricError>> + Send + '_>>;

    fn beginning_offsets(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeMap<u32, u64>, FabricError>> + Send + '_>>;

    fn end_offsets(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeMap<u32, u64>, FabricError>> + Send + '_>>;

    /// Last committed offset of `group`. `None` if the group never committed.
    fn committed(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Option<u64>, FabricError>> + Send + '_>>;

    /// Open a read session. Every opened session must be closed.
    fn open_session(&self, topic: &str) -> Pin<Box<dyn Future<Output = Result<SessionId, FabricError>> + Send + '_>>;

    /// Read up to `max` entries of one partition starting at `offset`.
    fn fetch(
        &self,
        session: SessionId,
        topic: &str,
        partition: u32,
        offset: u64,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BrokerRecord>, FabricError>> + Send + '_>>;

    /// Durably set the committed offsets of `group` (next offset to read, per partition).
    fn commit(
        &self,
        group: &str,
        topic: &str,
        offsets: BTreeMap<u32, u64>,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>>;

    /// Release a read session. Closing an unknown session is a no-op.
    fn close_session(&self, session: SessionId) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
