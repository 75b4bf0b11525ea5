use serde::Serialize;

use channel::ChannelClient;
use fabric_api::Outcome;
use table_store::{TableProvisioner, expected_location};

use crate::config::FabricConfig;
use crate::orchestrator::RunStatus;
use crate::schemas::{cleansed_schema, kpis_schema};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicResult {
    pub name: String,
    pub partitions: u32,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableResult {
    pub name: String,
    pub location: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BootstrapReport {
    pub status: RunStatus,
    pub topics: Vec<TopicResult>,
    pub tables: Vec<TableResult>,
    pub logs: Vec<String>,
}

/// Create the raw topic and provision both layer tables.
///
/// Idempotent: on an already provisioned environment every object reports
/// `skipped`, and misplaced tables are repaired.
pub async fn bootstrap(config: &FabricConfig, channel: &ChannelClient, provisioner: &TableProvisioner) -> BootstrapReport {
    let mut logs = Vec::new();
    let mut topics = Vec::new();
    let mut tables = Vec::new();

    let topic = &config.channel.raw_topic;
    let partitions = config.channel.partitions;
    logs.push(format!("Checking topic: {topic}..."));
    let outcome = channel.create_topic(topic, partitions).await;
    logs.push(outcome.describe(&format!("Topic {topic}")));
    topics.push(TopicResult { name: topic.clone(), partitions, outcome });

    for (target, schema) in [
        (&config.tables.cleansed, cleansed_schema()),
        (&config.tables.kpis, kpis_schema()),
    ] {
        let ident = target.ident();
        logs.push(format!("Checking table: {ident} in bucket {}...", target.bucket()));
        let outcome = provisioner.ensure_table(&ident, &target.root, &schema).await;
        logs.push(outcome.describe(&format!("Table {ident}")));
        tables.push(TableResult {
            name: target.qualified_name(),
            location: expected_location(&target.root, &ident),
            outcome,
        });
    }

    let ok = topics.iter().all(|t| t.outcome.is_success()) && tables.iter().all(|t| t.outcome.is_success());
    let status = if ok {
        logs.push("✓ Demo environment bootstrap completed successfully".to_string());
        RunStatus::Success
    } else {
        logs.push("✕ Demo environment bootstrap finished with errors".to_string());
        RunStatus::Error
    };
    tracing::info!(status = ?status, topics = topics.len(), tables = tables.len(), "bootstrap finished");

    BootstrapReport { status, topics, tables, logs }
}
