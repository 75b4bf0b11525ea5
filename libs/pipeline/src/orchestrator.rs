use std::fmt;
use std::time::Duration;

use serde::Serialize;

use channel::ChannelClient;
use fabric_api::{FabricError, Outcome, Record, Snapshot, TableSchema};
use table_store::TableProvisioner;

use crate::aggregate::{Kpi, aggregate};
use crate::config::{FabricConfig, TableConfig};
use crate::generator::SensorGenerator;
use crate::schemas::{cleansed_schema, kpis_schema};
use crate::validate::{as_record, cleanse};

// ═══════════════════════════════════════════════════════════════
//  Run model
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Consume,
    Cleanse,
    PersistCleansed,
    Aggregate,
    PersistAggregate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Ingest => "ingest",
            Stage::Consume => "consume",
            Stage::Cleanse => "cleanse",
            Stage::PersistCleansed => "persist_cleansed",
            Stage::Aggregate => "aggregate",
            Stage::PersistAggregate => "persist_aggregate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Done,
    /// Not executed: nothing to work on.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub events_ingested: usize,
    pub records_consumed: usize,
    /// Cleansed records written to the cleansed table.
    pub records_processed: usize,
    pub invalidated_count: usize,
    pub kpis_generated: usize,
    pub offsets_committed: bool,
}

/// Everything one invocation produced. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    pub status: RunStatus,
    pub message: String,
    pub logs: Vec<String>,
    pub stages: Vec<StageReport>,
    pub summary: RunSummary,
    pub kpi: Option<Kpi>,
}

impl PipelineRun {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Settings
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub topic: String,
    pub group: String,
    pub batch_size: usize,
    /// 0 = seed from the clock.
    pub seed: i64,
    pub consume_timeout: Duration,
    pub cleansed: TableConfig,
    pub kpis: TableConfig,
}

impl PipelineSettings {
    pub fn from_config(config: &FabricConfig) -> Self {
        Self {
            topic: config.channel.raw_topic.clone(),
            group: config.channel.consumer_group.clone(),
            batch_size: config.generator.batch_size,
            seed: config.generator.seed,
            consume_timeout: Duration::from_millis(config.channel.consume_timeout_ms),
            cleansed: config.tables.cleansed.clone(),
            kpis: config.tables.kpis.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline
// ═══════════════════════════════════════════════════════════════

struct Progress<F> {
    logs: Vec<String>,
    stages: Vec<StageReport>,
    on_stage: F,
}

impl<F: FnMut(&StageReport)> Progress<F> {
    fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    fn finish(&mut self, stage: Stage, status: StageStatus, detail: impl Into<String>) {
        let report = StageReport { stage, status, detail: detail.into() };
        tracing::info!(stage = %stage, status = ?status, detail = %report.detail, "stage finished");
        (self.on_stage)(&report);
        self.stages.push(report);
    }
}

/// Raw → cleansed → aggregated, one bounded batch per call.
///
/// Stages run strictly in order. A failing stage is narrated and reported,
/// and later stages still run on whatever data is available. Nothing is
/// rolled back. Two concurrent runs on the same consumer group race on
/// offset commits; serialize them at the caller.
pub struct Pipeline {
    channel: ChannelClient,
    provisioner: TableProvisioner,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(channel: ChannelClient, provisioner: TableProvisioner, settings: PipelineSettings) -> Self {
        Self { channel, provisioner, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(&self) -> PipelineRun {
        self.run_with_progress(|_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_stage` once per finished stage.
    pub async fn run_with_progress<F: FnMut(&StageReport)>(&self, on_stage: F) -> PipelineRun {
        let s = &self.settings;
        let mut p = Progress { logs: Vec::new(), stages: Vec::new(), on_stage };
        let mut summary = RunSummary::default();

        p.log("Initializing simulated IoT sensors...");

        // --- INGEST ---
        let count = s.batch_size;
        p.log(format!("Ingesting {count} telemetry events to topic '{}'...", s.topic));
        let events = SensorGenerator::new(s.seed).generate(count);
        let produced = self.channel.produce(&s.topic, &events).await;
        summary.events_ingested = produced.sent;
        match &produced.error {
            None => {
                p.log(format!("✓ {} events successfully published to {}", produced.sent, s.topic));
                p.finish(Stage::Ingest, StageStatus::Done, format!("{} events published", produced.sent));
            }
            Some(e) => {
                p.log(format!("✕ Failed to publish messages to {} after {} event(s): {e}", s.topic, produced.sent));
                p.finish(Stage::Ingest, StageStatus::Failed, format!("{} events published, then: {e}", produced.sent));
            }
        }

        // --- CONSUME ---
        p.log(format!("Reading batch from '{}'...", s.topic));
        let batch = self.channel.consume_and_commit(&s.topic, &s.group, s.consume_timeout).await;
        summary.records_consumed = batch.len();
        summary.offsets_committed = batch.committed;
        match (&batch.read_error, &batch.commit_error) {
            (Some(e), _) => {
                p.log(format!("✕ Failed to read from {}: {e}", s.topic));
                p.finish(Stage::Consume, StageStatus::Failed, format!("read failed: {e}"));
            }
            (None, Some(e)) => {
                p.log(format!("✓ Retrieved {} events from {}", batch.len(), s.topic));
                p.log(format!(
                    "✕ Offset commit failed for group '{}': {e}; continuing with uncommitted batch",
                    s.group
                ));
                p.finish(Stage::Consume, StageStatus::Failed, format!("{} events read, commit failed: {e}", batch.len()));
            }
            (None, None) => {
                p.log(format!("✓ Retrieved {} events from {}", batch.len(), s.topic));
                p.finish(Stage::Consume, StageStatus::Done, format!("{} events read", batch.len()));
            }
        }

        if batch.is_empty() {
            p.log("No new events to process.");
            for stage in [Stage::Cleanse, Stage::PersistCleansed, Stage::Aggregate, Stage::PersistAggregate] {
                p.finish(stage, StageStatus::Skipped, "no events consumed");
            }
            return Self::conclude(p, summary, None);
        }

        // --- CLEANSE ---
        p.log("Applying schema validation and data cleansing...");
        let records: Vec<Record> = batch.messages.iter().map(|m| as_record(&m.value)).collect();
        let cleansed = cleanse(&records);
        for (idx, record, _) in &cleansed.invalid {
            p.log(format!("Discarding invalid record {idx}: {}", serde_json::Value::Object(record.clone())));
        }
        summary.invalidated_count = cleansed.invalid.len();
        p.finish(
            Stage::Cleanse,
            StageStatus::Done,
            format!("{} valid, {} invalid", cleansed.valid.len(), cleansed.invalid.len()),
        );

        // --- PERSIST_CLEANSED ---
        let silver = &s.cleansed;
        if cleansed.valid.is_empty() {
            p.log(format!("→ No valid records to write, discarded {} invalid record(s)", summary.invalidated_count));
            p.finish(Stage::PersistCleansed, StageStatus::Skipped, "no valid records");
        } else {
            p.log(format!(
                "Writing {} cleansed records to '{}' and discarding {} invalid record(s)...",
                cleansed.valid.len(),
                silver.qualified_name(),
                summary.invalidated_count
            ));
            match self.persist(silver, cleansed_schema(), &cleansed.valid, &mut p).await {
                Ok(snapshot) => {
                    summary.records_processed = cleansed.valid.len();
                    p.log(format!("✓ Committed transaction to table {} (snapshot {})", silver.qualified_name(), snapshot.snapshot_id));
                    p.finish(Stage::PersistCleansed, StageStatus::Done, format!("snapshot {}", snapshot.snapshot_id));
                }
                Err(e) => {
                    p.log(format!("✕ Failed to write cleansed records to {}: {e}", silver.qualified_name()));
                    p.finish(Stage::PersistCleansed, StageStatus::Failed, e.to_string());
                }
            }
        }

        // --- AGGREGATE ---
        let gold = &s.kpis;
        p.log(format!("Querying '{}' for KPI calculation...", silver.qualified_name()));
        let kpi = match aggregate(&cleansed.valid) {
            Some(kpi) => {
                p.log("Calculating hourly aggregates (Avg Temp, Vibration anomalies)...");
                p.finish(
                    Stage::Aggregate,
                    StageStatus::Done,
                    format!("{} events, avg temp {}, {} anomalies", kpi.total_events, kpi.avg_temp, kpi.anomaly_count),
                );
                kpi
            }
            None => {
                p.log("No cleansed records available to calculate KPIs.");
                p.finish(Stage::Aggregate, StageStatus::Skipped, "no cleansed records");
                p.finish(Stage::PersistAggregate, StageStatus::Skipped, "no cleansed records");
                return Self::conclude(p, summary, None);
            }
        };

        // --- PERSIST_AGGREGATE ---
        p.log(format!(
            "Updating '{}' table with results: Avg Temp={}, Anomaly Count={}...",
            gold.qualified_name(),
            kpi.avg_temp,
            kpi.anomaly_count
        ));
        match self.persist(gold, kpis_schema(), &[kpi.to_record()], &mut p).await {
            Ok(snapshot) => {
                summary.kpis_generated = 1;
                p.log("✓ KPI dashboard view refreshed");
                p.finish(Stage::PersistAggregate, StageStatus::Done, format!("snapshot {}", snapshot.snapshot_id));
            }
            Err(e) => {
                p.log(format!("✕ Failed to update {}: {e}", gold.qualified_name()));
                p.finish(Stage::PersistAggregate, StageStatus::Failed, e.to_string());
            }
        }

        Self::conclude(p, summary, Some(kpi))
    }

    /// Provision the target table (narrating create/repair) and append.
    async fn persist<F: FnMut(&StageReport)>(
        &self,
        target: &TableConfig,
        schema: TableSchema,
        records: &[Record],
        p: &mut Progress<F>,
    ) -> Result<Snapshot, FabricError> {
        let ident = target.ident();
        let outcome = self.provisioner.ensure_table(&ident, &target.root, &schema).await;
        match &outcome {
            Outcome::Failed(reason) => {
                return Err(FabricError::logic(format!("table provisioning failed: {reason}")));
            }
            Outcome::Created | Outcome::Repaired => {
                p.log(outcome.describe(&format!("Table {}", target.qualified_name())));
            }
            Outcome::Skipped => {}
        }
        let store = self.provisioner.store();
        let handle = store.load_table(&ident).await?;
        store.append(&handle, records).await
    }

    fn conclude<F>(p: Progress<F>, summary: RunSummary, kpi: Option<Kpi>) -> PipelineRun {
        let failed: Vec<String> = p
            .stages
            .iter()
            .filter(|r| r.status == StageStatus::Failed)
            .map(|r| r.stage.to_string())
            .collect();
        let (status, message) = if failed.is_empty() {
            (RunStatus::Success, "Scenario iot_streaming completed successfully".to_string())
        } else {
            (RunStatus::Error, format!("Scenario iot_streaming finished with errors in: {}", failed.join(", ")))
        };
        tracing::info!(
            status = ?status,
            ingested = summary.events_ingested,
            processed = summary.records_processed,
            invalid = summary.invalidated_count,
            kpis = summary.kpis_generated,
            "pipeline run finished"
        );
        PipelineRun { status, message, logs: p.logs, stages: p.stages, summary, kpi }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use channel::{ChannelConfig, MemoryBroker};
    use fabric_api::{MessageBroker, TableCatalog};
    use serde_json::json;
    use table_store::{MemoryCatalog, RetryPolicy, StaticCredentials, TableStore};

    struct Fixture {
        broker: Arc<MemoryBroker>,
        catalog: Arc<MemoryCatalog>,
        pipeline: Pipeline,
    }

    fn fixture(batch_size: usize) -> Fixture {
        let broker = Arc::new(MemoryBroker::default());
        let catalog = Arc::new(MemoryCatalog::new());
        let store = TableStore::new(
            catalog.clone(),
            Arc::new(StaticCredentials::new("ak", "sk")),
            RetryPolicy::new(2, Duration::from_millis(1)),
        );
        let mut settings = PipelineSettings::from_config(&FabricConfig::default());
        settings.batch_size = batch_size;
        settings.seed = 11;
        let pipeline = Pipeline::new(
            ChannelClient::new(broker.clone(), ChannelConfig::default()),
            TableProvisioner::new(store),
            settings,
        );
        Fixture { broker, catalog, pipeline }
    }

    #[tokio::test]
    async fn reports_every_stage_in_order() {
        let f = fixture(20);
        let mut seen = Vec::new();
        let run = f.pipeline.run_with_progress(|r| seen.push(r.stage)).await;
        assert_eq!(
            seen,
            vec![
                Stage::Ingest,
                Stage::Consume,
                Stage::Cleanse,
                Stage::PersistCleansed,
                Stage::Aggregate,
                Stage::PersistAggregate
            ]
        );
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.summary.events_ingested, 20);
        assert_eq!(run.summary.records_consumed, 20);
        assert_eq!(run.summary.records_processed + run.summary.invalidated_count, 20);
        assert_eq!(run.summary.kpis_generated, 1);
        assert!(run.summary.offsets_committed);
        assert_eq!(run.logs[0], "Initializing simulated IoT sensors...");
        assert_eq!(run.logs.last().unwrap(), "✓ KPI dashboard view refreshed");
    }

    #[tokio::test]
    async fn only_valid_records_reach_the_cleansed_table() {
        let f = fixture(0);
        let raw = &f.pipeline.settings().topic;
        let good = json!({
            "event_id": "a", "device_id": "CNC-001", "timestamp": "2026-03-01T10:00:00+00:00",
            "temperature": 70.0, "vibration": 1.0, "status": "WARNING"
        });
        let hot = json!({
            "event_id": "b", "device_id": "CNC-002", "timestamp": "2026-03-01T10:00:01+00:00",
            "temperature": 99.0, "vibration": 1.0, "status": "OK"
        });
        f.broker.send(raw, serde_json::to_vec(&good).unwrap()).await.unwrap();
        f.broker.send(raw, serde_json::to_vec(&hot).unwrap()).await.unwrap();
        f.broker.send(raw, b"not json".to_vec()).await.unwrap();

        let run = f.pipeline.run().await;
        assert_eq!(run.summary.records_processed, 1);
        assert_eq!(run.summary.invalidated_count, 2);
        assert!(run.logs.iter().any(|l| l.starts_with("Discarding invalid record 1:")));

        let rows = f.catalog.scan(&f.pipeline.settings().cleansed.ident()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let kpi = run.kpi.unwrap();
        assert_eq!(kpi.total_events, 1);
        assert_eq!(kpi.anomaly_count, 1);
    }

    #[tokio::test]
    async fn empty_topic_skips_downstream_stages() {
        let f = fixture(0);
        let run = f.pipeline.run().await;
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.summary.kpis_generated, 0);
        for stage in [Stage::Cleanse, Stage::PersistCleansed, Stage::Aggregate, Stage::PersistAggregate] {
            assert_eq!(run.stage(stage).unwrap().status, StageStatus::Skipped);
        }
        assert!(f.catalog.list_namespaces().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_runs_do_not_reread() {
        let f = fixture(10);
        let first = f.pipeline.run().await;
        let second = f.pipeline.run().await;
        assert_eq!(first.summary.records_consumed, 10);
        assert_eq!(second.summary.records_consumed, 10);
        let kpis = f.catalog.scan(&f.pipeline.settings().kpis.ident()).await.unwrap();
        assert_eq!(kpis.len(), 2);
    }

    #[tokio::test]
    async fn commit_failure_is_surfaced_but_batch_processed() {
        let f = fixture(5);
        f.broker.set_reject_commits(true);
        let run = f.pipeline.run().await;
        assert_eq!(run.status, RunStatus::Error);
        assert!(!run.summary.offsets_committed);
        assert_eq!(run.stage(Stage::Consume).unwrap().status, StageStatus::Failed);
        assert_eq!(run.summary.records_consumed, 5);
        assert!(run.logs.iter().any(|l| l.starts_with("✕ Offset commit failed")));
    }

    #[tokio::test]
    async fn table_store_outage_fails_persist_but_run_completes() {
        let f = fixture(5);
        f.catalog.set_available(false);
        let run = f.pipeline.run().await;
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.stage(Stage::PersistCleansed).unwrap().status, StageStatus::Failed);
        assert_eq!(run.stage(Stage::Aggregate).unwrap().status, StageStatus::Done);
        assert_eq!(run.stage(Stage::PersistAggregate).unwrap().status, StageStatus::Failed);
        assert_eq!(run.summary.records_processed, 0);
        assert!(run.message.contains("persist_cleansed"));
    }

    #[tokio::test]
    async fn broker_outage_fails_ingest_and_consumes_nothing() {
        let f = fixture(5);
        f.broker.set_available(false);
        let run = f.pipeline.run().await;
        assert_eq!(run.stage(Stage::Ingest).unwrap().status, StageStatus::Failed);
        assert_eq!(run.stage(Stage::Consume).unwrap().status, StageStatus::Failed);
        assert_eq!(run.summary.records_consumed, 0);
        assert_eq!(run.status, RunStatus::Error);
    }

    #[tokio::test]
    async fn read_failure_is_not_mistaken_for_an_empty_topic() {
        let f = fixture(5);
        f.broker.set_reject_fetches(true);
        let run = f.pipeline.run().await;

        assert_eq!(run.summary.events_ingested, 5);
        assert_eq!(run.summary.records_consumed, 0);
        assert_eq!(run.stage(Stage::Consume).unwrap().status, StageStatus::Failed);
        assert_eq!(run.stage(Stage::Cleanse).unwrap().status, StageStatus::Skipped);
        assert_eq!(run.status, RunStatus::Error);
        assert!(run.logs.iter().any(|l| l.starts_with("✕ Failed to read from")));
        assert!(!run.logs.iter().any(|l| l.starts_with("✓ Retrieved")));
        assert!(run.message.contains("consume"));
    }

    #[tokio::test]
    async fn partial_publish_counts_what_was_sent() {
        let f = fixture(5);
        f.broker.fail_sends_after(3);
        let run = f.pipeline.run().await;

        assert_eq!(run.stage(Stage::Ingest).unwrap().status, StageStatus::Failed);
        assert_eq!(run.summary.events_ingested, 3);
        assert_eq!(run.summary.records_consumed, 3);
        assert!(run.logs.iter().any(|l| l.contains("after 3 event(s)")));
        assert_eq!(run.status, RunStatus::Error);
    }
}
