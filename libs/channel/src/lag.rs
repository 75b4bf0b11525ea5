use std::time::Duration;

use serde::Serialize;

use fabric_api::{ErrorKind, format_ts_ms, now_ms};

use crate::client::{ChannelClient, ChannelMessage};

// ═══════════════════════════════════════════════════════════════
//  Metrics types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionLag {
    pub partition: u32,
    pub beginning: u64,
    pub end: u64,
    /// Offset the group committed; `None` when it never committed here.
    pub committed: Option<u64>,
    pub lag: u64,
}

/// Health of one topic as seen by one consumer group.
///
/// Derived from live offsets on every query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicMetrics {
    pub topic: String,
    pub group: String,
    pub partition_count: usize,
    pub message_count: u64,
    pub total_lag: u64,
    pub processed: u64,
    pub partitions: Vec<PartitionLag>,
    /// Timestamp (Unix ms) of the oldest record the group has not consumed.
    pub oldest_unprocessed_ms: Option<i64>,
    /// `None` when the oldest-record probe failed.
    pub delay_seconds: Option<f64>,
    /// Lagging records per second of delay. `None` when the probe failed.
    pub processing_rate: Option<f64>,
    pub queue_depth_percent: f64,
    pub recent_message: Option<ChannelMessage>,
    /// Set when offsets could not be read; all counters are then zero.
    pub error: Option<String>,
}

impl TopicMetrics {
    fn zeroed(topic: &str, group: &str) -> Self {
        Self {
            topic: topic.to_string(),
            group: group.to_string(),
            partition_count: 0,
            message_count: 0,
            total_lag: 0,
            processed: 0,
            partitions: Vec::new(),
            oldest_unprocessed_ms: None,
            delay_seconds: Some(0.0),
            processing_rate: Some(0.0),
            queue_depth_percent: 0.0,
            recent_message: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedTopicMetrics {
    #[serde(flatten)]
    pub metrics: TopicMetrics,
    pub latest_message_timestamp: Option<String>,
    pub last_processed_timestamp: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  LagEngine
// ═══════════════════════════════════════════════════════════════

/// Computes consumer-group lag from offsets, plus an oldest-record probe.
#[derive(Clone)]
pub struct LagEngine {
    client: ChannelClient,
}

impl LagEngine {
    pub fn new(client: ChannelClient) -> Self {
        Self { client }
    }

    pub async fn topic_metrics(&self, topic: &str, group: &str) -> TopicMetrics {
        self.topic_metrics_at(topic, group, now_ms()).await
    }

    /// Same as [`topic_metrics`](Self::topic_metrics) with an explicit clock.
    pub async fn topic_metrics_at(&self, topic: &str, group: &str, now_ms: i64) -> TopicMetrics {
        let mut metrics = TopicMetrics::zeroed(topic, group);

        let partitions = match self.client.partitions(topic).await {
            Ok(p) => p,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::error!(topic = %topic, group = %group, error = %e, "error listing partitions");
                metrics.error = Some(e.to_string());
                return metrics;
            }
        };
        if partitions.is_empty() {
            tracing::debug!(topic = %topic, "topic has no partitions");
            return metrics;
        }

        let offsets = async {
            let beginning = self.client.beginning_offsets(topic).await?;
            let end = self.client.end_offsets(topic).await?;
            let mut lags = Vec::with_capacity(partitions.len());
            for p in partitions {
                let b = beginning.get(&p).copied().unwrap_or(0);
                let e = end.get(&p).copied().unwrap_or(b);
                let committed = self.client.committed_offset(group, topic, p).await?;
                let position = committed.unwrap_or(b);
                lags.push(PartitionLag {
                    partition: p,
                    beginning: b,
                    end: e,
                    committed,
                    lag: e.saturating_sub(position),
                });
            }
            Ok::<_, fabric_api::FabricError>(lags)
        };

        let lags = match offsets.await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(topic = %topic, group = %group, error = %e, "error reading topic offsets");
                metrics.error = Some(e.to_string());
                return metrics;
            }
        };
        metrics.partition_count = lags.len();
        metrics.message_count = lags.iter().map(|l| l.end.saturating_sub(l.beginning)).sum();
        metrics.total_lag = lags.iter().map(|l| l.lag).sum();
        metrics.processed = metrics.message_count.saturating_sub(metrics.total_lag);
        if metrics.message_count > 0 {
            metrics.queue_depth_percent =
                round_to(metrics.total_lag as f64 / metrics.message_count as f64 * 100.0, 1);
        }

        let lagging: Vec<(u32, u64)> = lags
            .iter()
            .filter(|l| l.lag > 0)
            .map(|l| (l.partition, l.committed.unwrap_or(l.beginning).max(l.beginning)))
            .collect();
        metrics.partitions = lags;

        if !lagging.is_empty() {
            match self.client.oldest_timestamp_at(topic, &lagging).await {
                Ok(oldest) => {
                    metrics.oldest_unprocessed_ms = oldest;
                    let delay = oldest.map_or(0.0, |ts| ((now_ms - ts) as f64 / 1000.0).max(0.0));
                    let rate = if delay > 0.0 && metrics.total_lag > 0 {
                        metrics.total_lag as f64 / delay
                    } else {
                        0.0
                    };
                    metrics.delay_seconds = Some(round_to(delay, 2));
                    metrics.processing_rate = Some(round_to(rate, 1));
                }
                Err(e) => {
                    tracing::warn!(topic = %topic, group = %group, error = %e, "oldest-record probe failed, reporting lag only");
                    metrics.delay_seconds = None;
                    metrics.processing_rate = None;
                }
            }
        }

        metrics.recent_message = match self.client.latest_message(topic).await {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(topic = %topic, error = %e, "recent message unavailable");
                None
            }
        };

        metrics
    }

    /// Topic metrics plus the newest message time and an estimate of the
    /// time of the last record the group processed.
    pub async fn detailed_metrics(&self, topic: &str, group: &str) -> DetailedTopicMetrics {
        let metrics = self.topic_metrics(topic, group).await;
        let timeout = Duration::from_millis(self.client.config().peek_timeout_ms);
        let latest_ms = self
            .client
            .peek(topic, 1, timeout)
            .await
            .first()
            .map(|m| m.timestamp_ms);

        let last_processed = latest_ms.map(|latest| match metrics.delay_seconds {
            Some(delay) if delay > 0.0 => latest - (delay * 1000.0) as i64,
            _ => latest,
        });

        DetailedTopicMetrics {
            latest_message_timestamp: latest_ms.and_then(format_ts_ms),
            last_processed_timestamp: last_processed.and_then(format_ts_ms),
            metrics,
        }
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::ChannelConfig;
    use crate::memory::MemoryBroker;
    use fabric_api::MessageBroker;

    async fn setup(partitions: u32) -> (Arc<MemoryBroker>, ChannelClient, LagEngine) {
        let broker = Arc::new(MemoryBroker::default());
        broker.create_topic("raw", partitions).await.unwrap();
        let client = ChannelClient::new(broker.clone(), ChannelConfig::default());
        let engine = LagEngine::new(client.clone());
        (broker, client, engine)
    }

    async fn fill(broker: &MemoryBroker, partition: u32, timestamps: &[i64]) {
        for &ts in timestamps {
            broker.append_at("raw", partition, ts, b"{}".to_vec()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_topic_yields_zeroed_metrics() {
        let (_b, _c, engine) = setup(1).await;
        let m = engine.topic_metrics("missing", "g").await;
        assert_eq!(m.partition_count, 0);
        assert_eq!(m.message_count, 0);
        assert_eq!(m.delay_seconds, Some(0.0));
        assert_eq!(m.processing_rate, Some(0.0));
        assert!(m.partitions.is_empty());
        assert!(m.error.is_none());
    }

    #[tokio::test]
    async fn lag_is_end_minus_committed_per_partition() {
        let (broker, _c, engine) = setup(2).await;
        fill(&broker, 0, &[1_000, 2_000, 3_000, 4_000]).await;
        fill(&broker, 1, &[1_500, 2_500]).await;
        let mut offsets = std::collections::BTreeMap::new();
        offsets.insert(0, 3);
        broker.commit("g", "raw", offsets).await.unwrap();

        let m = engine.topic_metrics_at("raw", "g", 11_500).await;
        assert_eq!(m.message_count, 6);
        let lags: Vec<u64> = m.partitions.iter().map(|p| p.lag).collect();
        assert_eq!(lags, vec![1, 2]);
        assert_eq!(m.total_lag, 3);
        assert_eq!(m.processed, 3);
        // oldest unprocessed: p0@3 (4000) vs p1@0 (1500)
        assert_eq!(m.oldest_unprocessed_ms, Some(1_500));
        assert_eq!(m.delay_seconds, Some(10.0));
        assert_eq!(m.processing_rate, Some(0.3));
        assert_eq!(m.queue_depth_percent, 50.0);
        assert_eq!(broker.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn no_lag_means_zero_delay_and_rate() {
        let (broker, client, engine) = setup(1).await;
        fill(&broker, 0, &[1_000, 2_000]).await;
        client.consume_and_commit("raw", "g", Duration::from_secs(1)).await;

        let m = engine.topic_metrics_at("raw", "g", 99_000).await;
        assert_eq!(m.total_lag, 0);
        assert_eq!(m.delay_seconds, Some(0.0));
        assert_eq!(m.processing_rate, Some(0.0));
        assert_eq!(m.oldest_unprocessed_ms, None);
        assert_eq!(m.queue_depth_percent, 0.0);
    }

    #[tokio::test]
    async fn probe_failure_degrades_to_lag_only() {
        let (broker, _c, engine) = setup(1).await;
        fill(&broker, 0, &[1_000, 2_000]).await;
        broker.set_reject_fetches(true);

        let m = engine.topic_metrics_at("raw", "g", 5_000).await;
        assert_eq!(m.total_lag, 2);
        assert_eq!(m.delay_seconds, None);
        assert_eq!(m.processing_rate, None);
        assert!(m.error.is_none());
        assert_eq!(broker.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn unreachable_broker_reports_error() {
        let (broker, _c, engine) = setup(1).await;
        broker.set_available(false);
        let m = engine.topic_metrics("raw", "g").await;
        assert_eq!(m.total_lag, 0);
        assert!(m.error.is_some());
    }

    #[tokio::test]
    async fn clock_skew_never_produces_negative_delay() {
        let (broker, _c, engine) = setup(1).await;
        fill(&broker, 0, &[10_000]).await;
        let m = engine.topic_metrics_at("raw", "g", 5_000).await;
        assert_eq!(m.delay_seconds, Some(0.0));
        assert_eq!(m.processing_rate, Some(0.0));
    }

    #[tokio::test]
    async fn recent_message_comes_from_highest_end() {
        let (broker, _c, engine) = setup(2).await;
        broker.append_at("raw", 0, 1, b"{\"n\":1}".to_vec()).await.unwrap();
        broker.append_at("raw", 1, 2, b"{\"n\":2}".to_vec()).await.unwrap();
        broker.append_at("raw", 1, 3, b"{\"n\":3}".to_vec()).await.unwrap();
        let m = engine.topic_metrics("raw", "g").await;
        assert_eq!(m.recent_message.unwrap().value["n"], 3);
    }

    #[tokio::test]
    async fn detailed_metrics_offsets_last_processed_by_delay() {
        let (broker, _c, engine) = setup(1).await;
        let now = now_ms();
        fill(&broker, 0, &[now - 60_000, now - 1_000]).await;

        let d = engine.detailed_metrics("raw", "g").await;
        assert_eq!(d.metrics.total_lag, 2);
        assert_eq!(d.latest_message_timestamp, format_ts_ms(now - 1_000));
        let delay = d.metrics.delay_seconds.unwrap();
        assert!(delay >= 60.0);
        assert!(d.last_processed_timestamp.is_some());
        assert_ne!(d.last_processed_timestamp, d.latest_message_timestamp);
    }
}
