use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use fabric_api::{
    BrokerRecord, ErrorKind, FabricError, MessageBroker, Outcome, Record, SessionId, TopicInfo,
    format_ts_ms,
};

/// Entries requested per fetch while draining a partition.
const FETCH_CHUNK: usize = 500;

// ═══════════════════════════════════════════════════════════════
//  ChannelConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_batch() -> usize {
    100
}

fn default_peek_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Produce cap: larger batches are truncated to the first `max_batch` records.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Bounded wait for `peek_unprocessed`, which takes no timeout argument.
    #[serde(default = "default_peek_timeout_ms")]
    pub peek_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            peek_timeout_ms: default_peek_timeout_ms(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  ChannelMessage / ConsumeBatch
// ═══════════════════════════════════════════════════════════════

/// A decoded broker entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMessage {
    pub partition: u32,
    pub offset: u64,
    pub timestamp_ms: i64,
    /// RFC 3339 rendering of `timestamp_ms`.
    pub timestamp: Option<String>,
    /// JSON payload; non-JSON bytes degrade to a lossy UTF-8 string.
    pub value: serde_json::Value,
}

impl ChannelMessage {
    fn decode(record: BrokerRecord) -> Self {
        let value = serde_json::from_slice(&record.payload).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&record.payload).into_owned())
        });
        Self {
            partition: record.partition,
            offset: record.offset,
            timestamp_ms: record.timestamp_ms,
            timestamp: format_ts_ms(record.timestamp_ms),
            value,
        }
    }
}

/// How much of a `produce` batch reached the broker.
#[derive(Debug, Clone, Default)]
pub struct Produced {
    pub sent: usize,
    /// First send failure; records after it were not sent.
    pub error: Option<FabricError>,
}

impl Produced {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// What `consume_and_commit` read, and whether the group's offsets moved.
#[derive(Debug, Clone, Default)]
pub struct ConsumeBatch {
    pub messages: Vec<ChannelMessage>,
    /// `true` when the read offsets were committed, or nothing needed committing.
    pub committed: bool,
    /// Set when reading succeeded but the commit did not.
    pub commit_error: Option<FabricError>,
    /// Set when the backlog could not be read. `messages` is then empty.
    pub read_error: Option<FabricError>,
}

impl ConsumeBatch {
    fn unread(err: FabricError) -> Self {
        Self { read_error: Some(err), ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
//  ChannelClient
// ═══════════════════════════════════════════════════════════════

/// Produce / consume / peek semantics over a `MessageBroker`.
///
/// Read and produce operations never fail past this boundary: errors are
/// logged and turn into an empty result (or `false`). Offset introspection
/// returns `Result` so callers like the lag engine can degrade on their own.
#[derive(Clone)]
pub struct ChannelClient {
    broker: Arc<dyn MessageBroker>,
    config: ChannelConfig,
}

impl ChannelClient {
    pub fn new(broker: Arc<dyn MessageBroker>, config: ChannelConfig) -> Self {
        Self { broker, config }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    // ── Admin ──

    pub async fn create_topic(&self, topic: &str, partitions: u32) -> Outcome {
        match self.broker.create_topic(topic, partitions).await {
            Ok(()) => {
                tracing::info!(topic = %topic, partitions, "topic created");
                Outcome::Created
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Outcome::Skipped,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "create topic failed");
                Outcome::Failed(e.to_string())
            }
        }
    }

    pub async fn list_topics(&self) -> Vec<TopicInfo> {
        self.broker.list_topics().await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "list topics failed");
            Vec::new()
        })
    }

    // ── Produce ──

    /// Fire-and-forget send of a batch. Records past `max_batch` are dropped.
    ///
    /// Stops at the first failure; `sent` counts what the broker accepted
    /// before it.
    pub async fn produce(&self, topic: &str, records: &[Record]) -> Produced {
        let cap = self.config.max_batch;
        if records.len() > cap {
            tracing::debug!(topic = %topic, requested = records.len(), cap, "truncating produce batch");
        }
        let mut out = Produced::default();
        for record in records.iter().take(cap) {
            let sent = match serde_json::to_vec(record) {
                Ok(payload) => self.broker.send(topic, payload).await.map(|_| ()),
                Err(e) => Err(FabricError::from(e)),
            };
            if let Err(e) = sent {
                tracing::error!(topic = %topic, sent = out.sent, error = %e, "error publishing messages");
                out.error = Some(e);
                break;
            }
            out.sent += 1;
        }
        out
    }

    // ── Consume ──

    /// Read everything `group` has not consumed yet (up to `end`, or until
    /// `timeout` elapses), then synchronously commit the read positions.
    ///
    /// A failed commit does not discard the batch: it is returned with
    /// `committed = false` and the error attached.
    pub async fn consume_and_commit(&self, topic: &str, group: &str, timeout: Duration) -> ConsumeBatch {
        let deadline = Instant::now() + timeout;
        let session = match self.broker.open_session(topic).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(topic = %topic, group = %group, error = %e, "error consuming messages");
                return ConsumeBatch::unread(e);
            }
        };
        let read = self.read_group_backlog(session, topic, group, None, deadline).await;
        self.broker.close_session(session).await;

        let messages = match read {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(topic = %topic, group = %group, error = %e, "error consuming messages");
                return ConsumeBatch::unread(e);
            }
        };

        let mut next: BTreeMap<u32, u64> = BTreeMap::new();
        for m in &messages {
            let pos = next.entry(m.partition).or_default();
            *pos = (*pos).max(m.offset + 1);
        }
        if next.is_empty() {
            return ConsumeBatch { messages, committed: true, ..Default::default() };
        }

        match self.broker.commit(group, topic, next).await {
            Ok(()) => {
                tracing::debug!(topic = %topic, group = %group, count = messages.len(), "offsets committed");
                ConsumeBatch { messages, committed: true, ..Default::default() }
            }
            Err(e) => {
                tracing::error!(topic = %topic, group = %group, error = %e, "offset commit failed, batch left uncommitted");
                ConsumeBatch { messages, committed: false, commit_error: Some(e), read_error: None }
            }
        }
    }

    // ── Peek ──

    /// Recent messages without any group involvement.
    ///
    /// Each partition is read from `end - limit / partitions` (at least one per
    /// partition). Result is newest first.
    pub async fn peek(&self, topic: &str, limit: usize, timeout: Duration) -> Vec<ChannelMessage> {
        match self.try_peek(topic, limit, Instant::now() + timeout).await {
            Ok(mut messages) => {
                messages.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms).then(b.offset.cmp(&a.offset)));
                messages
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "error listing messages");
                Vec::new()
            }
        }
    }

    /// The backlog `group` has not consumed yet, without committing anything.
    pub async fn peek_unprocessed(&self, topic: &str, group: &str, limit: usize) -> Vec<ChannelMessage> {
        let deadline = Instant::now() + Duration::from_millis(self.config.peek_timeout_ms);
        let session = match self.broker.open_session(topic).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(topic = %topic, group = %group, error = %e, "error listing unprocessed messages");
                return Vec::new();
            }
        };
        let read = self.read_group_backlog(session, topic, group, Some(limit), deadline).await;
        self.broker.close_session(session).await;
        read.unwrap_or_else(|e| {
            tracing::error!(topic = %topic, group = %group, error = %e, "error listing unprocessed messages");
            Vec::new()
        })
    }

    // ── Offset introspection ──

    pub async fn partitions(&self, topic: &str) -> Result<Vec<u32>, FabricError> {
        self.broker.partitions(topic).await
    }

    pub async fn beginning_offsets(&self, topic: &str) -> Result<BTreeMap<u32, u64>, FabricError> {
        self.broker.beginning_offsets(topic).await
    }

    pub async fn end_offsets(&self, topic: &str) -> Result<BTreeMap<u32, u64>, FabricError> {
        self.broker.end_offsets(topic).await
    }

    pub async fn committed_offset(&self, group: &str, topic: &str, partition: u32) -> Result<Option<u64>, FabricError> {
        self.broker.committed(group, topic, partition).await
    }

    /// Read exactly one message at each `(partition, offset)` and return the
    /// smallest timestamp seen. The read session is closed on every path.
    pub async fn oldest_timestamp_at(&self, topic: &str, positions: &[(u32, u64)]) -> Result<Option<i64>, FabricError> {
        let session = self.broker.open_session(topic).await?;
        let mut oldest: Option<i64> = None;
        let mut result = Ok(());
        for &(partition, offset) in positions {
            match self.broker.fetch(session, topic, partition, offset, 1).await {
                Ok(records) => {
                    if let Some(r) = records.first() {
                        oldest = Some(oldest.map_or(r.timestamp_ms, |o| o.min(r.timestamp_ms)));
                    }
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.broker.close_session(session).await;
        result.map(|()| oldest)
    }

    /// Message at `end - 1` of the partition with the highest end offset.
    pub async fn latest_message(&self, topic: &str) -> Result<Option<ChannelMessage>, FabricError> {
        let beginning = self.broker.beginning_offsets(topic).await?;
        let end = self.broker.end_offsets(topic).await?;
        let Some((&partition, &last_end)) = end
            .iter()
            .filter(|(p, e)| **e > beginning.get(p).copied().unwrap_or(0))
            .max_by_key(|(_, e)| **e)
        else {
            return Ok(None);
        };
        let session = self.broker.open_session(topic).await?;
        let fetched = self.broker.fetch(session, topic, partition, last_end - 1, 1).await;
        self.broker.close_session(session).await;
        Ok(fetched?.into_iter().next().map(ChannelMessage::decode))
    }

    // ── internals ──

    async fn try_peek(&self, topic: &str, limit: usize, deadline: Instant) -> Result<Vec<ChannelMessage>, FabricError> {
        let partitions = self.broker.partitions(topic).await?;
        if partitions.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let beginning = self.broker.beginning_offsets(topic).await?;
        let end = self.broker.end_offsets(topic).await?;
        let per_partition = (limit / partitions.len()).max(1) as u64;

        let session = self.broker.open_session(topic).await?;
        let mut out = Vec::new();
        let mut result = Ok(());
        for &p in &partitions {
            let stop = end.get(&p).copied().unwrap_or(0);
            let start = stop
                .saturating_sub(per_partition)
                .max(beginning.get(&p).copied().unwrap_or(0));
            let remaining = limit - out.len();
            if let Err(e) = self
                .drain(session, topic, p, start, stop, remaining, deadline, &mut out)
                .await
            {
                result = Err(e);
                break;
            }
            if out.len() >= limit {
                break;
            }
        }
        self.broker.close_session(session).await;
        result.map(|()| out)
    }

    /// Read each partition forward from the group's committed offset
    /// (or `beginning`) up to `end`, optionally capped at `limit` in total.
    async fn read_group_backlog(
        &self,
        session: SessionId,
        topic: &str,
        group: &str,
        limit: Option<usize>,
        deadline: Instant,
    ) -> Result<Vec<ChannelMessage>, FabricError> {
        let partitions = self.broker.partitions(topic).await?;
        if partitions.is_empty() {
            return Ok(Vec::new());
        }
        let beginning = self.broker.beginning_offsets(topic).await?;
        let end = self.broker.end_offsets(topic).await?;

        let mut out = Vec::new();
        for &p in &partitions {
            let floor = beginning.get(&p).copied().unwrap_or(0);
            let start = self
                .broker
                .committed(group, topic, p)
                .await?
                .unwrap_or(floor)
                .max(floor);
            let stop = end.get(&p).copied().unwrap_or(0);
            let remaining = match limit {
                Some(l) if out.len() >= l => break,
                Some(l) => l - out.len(),
                None => usize::MAX,
            };
            self.drain(session, topic, p, start, stop, remaining, deadline, &mut out).await?;
            if Instant::now() >= deadline {
                tracing::debug!(topic = %topic, group = %group, "read deadline reached");
                break;
            }
        }
        Ok(out)
    }

    /// Fetch `[start, stop)` of one partition in chunks into `out`.
    /// Stops early at `max` messages or when the deadline passes.
    #[allow(clippy::too_many_arguments)]
    async fn drain(
        &self,
        session: SessionId,
        topic: &str,
        partition: u32,
        start: u64,
        stop: u64,
        max: usize,
        deadline: Instant,
        out: &mut Vec<ChannelMessage>,
    ) -> Result<(), FabricError> {
        let mut pos = start;
        let mut taken = 0usize;
        while pos < stop && taken < max {
            let want = ((stop - pos) as usize).min(max - taken).min(FETCH_CHUNK);
            let fetch = self.broker.fetch(session, topic, partition, pos, want);
            let records = match tokio::time::timeout_at(deadline, fetch).await {
                Ok(r) => r?,
                Err(_) => break,
            };
            let Some(last) = records.last() else { break };
            pos = last.offset + 1;
            taken += records.len();
            out.extend(records.into_iter().map(ChannelMessage::decode));
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(())
    }
}
