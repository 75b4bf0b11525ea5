use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use fabric_api::{BrokerRecord, FabricError, MessageBroker, SessionId, TopicInfo, now_ms};

use crate::error::ChannelError;

// ═══════════════════════════════════════════════════════════════
//  MemoryBrokerConfig
// ═══════════════════════════════════════════════════════════════

fn default_partitions() -> u32 {
    1
}

fn default_max_records() -> usize {
    100_000
}

fn default_auto_create() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryBrokerConfig {
    /// Partition count for topics created implicitly by `send`.
    #[serde(default = "default_partitions")]
    pub default_partitions: u32,
    /// Retention per partition; older entries are dropped and `beginning` advances.
    #[serde(default = "default_max_records")]
    pub max_records_per_partition: usize,
    #[serde(default = "default_auto_create")]
    pub auto_create_topics: bool,
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            default_partitions: default_partitions(),
            max_records_per_partition: default_max_records(),
            auto_create_topics: default_auto_create(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Partition log
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    timestamp_ms: i64,
    #[serde(with = "payload_b64")]
    payload: Vec<u8>,
}

/// Ring buffer with a moving base offset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PartitionLog {
    base_offset: u64,
    entries: VecDeque<Entry>,
}

impl PartitionLog {
    fn beginning(&self) -> u64 {
        self.base_offset
    }

    fn end(&self) -> u64 {
        self.base_offset + self.entries.len() as u64
    }

    fn append(&mut self, entry: Entry, max_records: usize) -> u64 {
        if max_records > 0 && self.entries.len() >= max_records {
            self.entries.pop_front();
            self.base_offset += 1;
        }
        let offset = self.end();
        self.entries.push_back(entry);
        offset
    }

    fn read(&self, partition: u32, offset: u64, max: usize) -> Vec<BrokerRecord> {
        let start = offset.max(self.base_offset);
        let skip = (start - self.base_offset) as usize;
        self.entries
            .iter()
            .skip(skip)
            .take(max)
            .enumerate()
            .map(|(i, e)| BrokerRecord {
                partition,
                offset: start + i as u64,
                timestamp_ms: e.timestamp_ms,
                payload: e.payload.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TopicLog {
    partitions: Vec<PartitionLog>,
    /// Round-robin cursor of the default partitioner.
    next_partition: u32,
}

impl TopicLog {
    fn new(partitions: u32) -> Self {
        Self {
            partitions: (0..partitions.max(1)).map(|_| PartitionLog::default()).collect(),
            next_partition: 0,
        }
    }

    fn partition(&self, topic: &str, partition: u32) -> Result<&PartitionLog, ChannelError> {
        self.partitions
            .get(partition as usize)
            .ok_or_else(|| ChannelError::PartitionNotFound { topic: topic.to_string(), partition })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Snapshot
// ═══════════════════════════════════════════════════════════════

/// Durable broker state: logs and committed offsets. Sessions are not part of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    topics: BTreeMap<String, TopicLog>,
    /// group → topic → partition → next offset to read.
    committed: BTreeMap<String, BTreeMap<String, BTreeMap<u32, u64>>>,
}

#[derive(Default)]
struct BrokerState {
    durable: BrokerSnapshot,
    sessions: HashSet<SessionId>,
    next_session: SessionId,
}

// ═══════════════════════════════════════════════════════════════
//  MemoryBroker
// ═══════════════════════════════════════════════════════════════

/// In-process partitioned log. Implements the full `MessageBroker` contract
/// and exposes a few fault hooks for exercising client error paths.
pub struct MemoryBroker {
    config: MemoryBrokerConfig,
    state: RwLock<BrokerState>,
    available: AtomicBool,
    reject_commits: AtomicBool,
    reject_fetches: AtomicBool,
    send_budget: AtomicUsize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

impl MemoryBroker {
    pub fn new(config: MemoryBrokerConfig) -> Self {
        Self::from_snapshot(config, BrokerSnapshot::default())
    }

    pub fn from_snapshot(config: MemoryBrokerConfig, mut snapshot: BrokerSnapshot) -> Self {
        for (topic, log) in snapshot.topics.iter_mut() {
            if log.partitions.is_empty() {
                tracing::warn!(topic = %topic, "restored topic has no partitions, adding one");
                log.partitions.push(PartitionLog::default());
            }
            log.next_partition %= log.partitions.len() as u32;
        }
        Self {
            config,
            state: RwLock::new(BrokerState { durable: snapshot, ..Default::default() }),
            available: AtomicBool::new(true),
            reject_commits: AtomicBool::new(false),
            reject_fetches: AtomicBool::new(false),
            send_budget: AtomicUsize::new(usize::MAX),
        }
    }

    pub async fn snapshot(&self) -> BrokerSnapshot {
        self.state.read().await.durable.clone()
    }

    /// Simulate the broker going away (every call fails with `Connectivity`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make `commit` fail while reads keep working.
    pub fn set_reject_commits(&self, reject: bool) {
        self.reject_commits.store(reject, Ordering::SeqCst);
    }

    /// Make `fetch` fail while offset queries keep working.
    pub fn set_reject_fetches(&self, reject: bool) {
        self.reject_fetches.store(reject, Ordering::SeqCst);
    }

    /// Accept only `sends` more `send` calls, then fail with `Connectivity`.
    pub fn fail_sends_after(&self, sends: usize) {
        self.send_budget.store(sends, Ordering::SeqCst);
    }

    /// Number of read sessions not yet closed.
    pub async fn open_sessions(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Append to an explicit partition with an explicit timestamp.
    pub async fn append_at(
        &self,
        topic: &str,
        partition: u32,
        timestamp_ms: i64,
        payload: Vec<u8>,
    ) -> Result<u64, FabricError> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let log = state
            .durable
            .topics
            .get_mut(topic)
            .ok_or_else(|| ChannelError::TopicNotFound(topic.to_string()))?;
        let part = log
            .partitions
            .get_mut(partition as usize)
            .ok_or_else(|| ChannelError::PartitionNotFound { topic: topic.to_string(), partition })?;
        Ok(part.append(Entry { timestamp_ms, payload }, self.config.max_records_per_partition))
    }

    fn check_available(&self) -> Result<(), ChannelError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChannelError::Unavailable)
        }
    }

    async fn offsets(
        &self,
        topic: &str,
        pick: fn(&PartitionLog) -> u64,
    ) -> Result<BTreeMap<u32, u64>, FabricError> {
        self.check_available()?;
        let state = self.state.read().await;
        let log = state
            .durable
            .topics
            .get(topic)
            .ok_or_else(|| ChannelError::TopicNotFound(topic.to_string()))?;
        Ok(log
            .partitions
            .iter()
            .enumerate()
            .map(|(p, part)| (p as u32, pick(part)))
            .collect())
    }
}

impl MessageBroker for MemoryBroker {
    fn create_topic(
        &self,
        topic: &str,
        partitions: u32,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.check_available()?;
            let mut state = self.state.write().await;
            if state.durable.topics.contains_key(&topic) {
                return Err(FabricError::already_exists(format!("topic '{topic}' already exists")));
            }
            state.durable.topics.insert(topic.clone(), TopicLog::new(partitions));
            tracing::debug!(topic = %topic, partitions, "topic created");
            Ok(())
        })
    }

    fn list_topics(&self) -> Pin<Box<dyn Future<Output = Result<Vec<TopicInfo>, FabricError>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            let state = self.state.read().await;
            Ok(state
                .durable
                .topics
                .iter()
                .map(|(name, log)| TopicInfo { name: name.clone(), partitions: log.partitions.len() as u32 })
                .collect())
        })
    }

    fn partitions(&self, topic: &str) -> Pin<Box<dyn Future<Output = Result<Vec<u32>, FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.check_available()?;
            let state = self.state.read().await;
            Ok(state
                .durable
                .topics
                .get(&topic)
                .map(|log| (0..log.partitions.len() as u32).collect())
                .unwrap_or_default())
        })
    }

    fn send(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(u32, u64), FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.check_available()?;
            if self
                .send_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
            {
                return Err(ChannelError::Unavailable.into());
            }
            let mut state = self.state.write().await;
            if !state.durable.topics.contains_key(&topic) {
                if !self.config.auto_create_topics {
                    return Err(ChannelError::TopicNotFound(topic).into());
                }
                tracing::info!(topic = %topic, "auto-creating topic on first send");
                state
                    .durable
                    .topics
                    .insert(topic.clone(), TopicLog::new(self.config.default_partitions));
            }
            let log = state
                .durable
                .topics
                .get_mut(&topic)
                .ok_or_else(|| ChannelError::TopicNotFound(topic.clone()))?;
            let count = log.partitions.len() as u32;
            let partition = log.next_partition % count;
            log.next_partition = (partition + 1) % count;
            let entry = Entry { timestamp_ms: now_ms(), payload };
            let offset = log.partitions[partition as usize].append(entry, self.config.max_records_per_partition);
            Ok((partition, offset))
        })
    }

    fn beginning_offsets(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeMap<u32, u64>, FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move { self.offsets(&topic, PartitionLog::beginning).await })
    }

    fn end_offsets(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeMap<u32, u64>, FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move { self.offsets(&topic, PartitionLog::end).await })
    }

    fn committed(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Option<u64>, FabricError>> + Send + '_>> {
        let group = group.to_string();
        let topic = topic.to_string();
        Box::pin(async move {
            self.check_available()?;
            let state = self.state.read().await;
            Ok(state
                .durable
                .committed
                .get(&group)
                .and_then(|topics| topics.get(&topic))
                .and_then(|parts| parts.get(&partition))
                .copied())
        })
    }

    fn open_session(&self, topic: &str) -> Pin<Box<dyn Future<Output = Result<SessionId, FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.check_available()?;
            let mut state = self.state.write().await;
            state.next_session += 1;
            let id = state.next_session;
            state.sessions.insert(id);
            tracing::trace!(topic = %topic, session = id, "read session opened");
            Ok(id)
        })
    }

    fn fetch(
        &self,
        session: SessionId,
        topic: &str,
        partition: u32,
        offset: u64,
        max: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BrokerRecord>, FabricError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.check_available()?;
            let state = self.state.read().await;
            if !state.sessions.contains(&session) {
                return Err(ChannelError::SessionClosed(session).into());
            }
            if self.reject_fetches.load(Ordering::SeqCst) {
                return Err(ChannelError::Unavailable.into());
            }
            let log = state
                .durable
                .topics
                .get(&topic)
                .ok_or_else(|| ChannelError::TopicNotFound(topic.clone()))?;
            Ok(log.partition(&topic, partition)?.read(partition, offset, max))
        })
    }

    fn commit(
        &self,
        group: &str,
        topic: &str,
        offsets: BTreeMap<u32, u64>,
    ) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        let group = group.to_string();
        let topic = topic.to_string();
        Box::pin(async move {
            self.check_available()?;
            if self.reject_commits.load(Ordering::SeqCst) {
                return Err(ChannelError::CommitRejected(group).into());
            }
            let mut state = self.state.write().await;
            let log = state
                .durable
                .topics
                .get(&topic)
                .ok_or_else(|| ChannelError::TopicNotFound(topic.clone()))?;
            for (&partition, &offset) in &offsets {
                let end = log.partition(&topic, partition)?.end();
                if offset > end {
                    return Err(FabricError::logic(format!(
                        "commit offset {offset} beyond end {end} of {topic}[{partition}]"
                    )));
                }
            }
            let parts = state
                .durable
                .committed
                .entry(group)
                .or_default()
                .entry(topic)
                .or_default();
            parts.extend(offsets);
            Ok(())
        })
    }

    fn close_session(&self, session: SessionId) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.state.write().await.sessions.remove(&session);
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Snapshot payload encoding
// ═══════════════════════════════════════════════════════════════

mod payload_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
