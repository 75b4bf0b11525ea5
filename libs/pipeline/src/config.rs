use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use channel::ChannelConfig;
use fabric_api::TableIdent;
use table_store::RetryPolicy;

use crate::error::PipelineError;
use crate::profile::ConnectionProfile;

/// Root configuration, parsed from TOML. Every section has defaults, so an
/// empty document describes the built-in demo setup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FabricConfig {
    #[serde(default)]
    pub profile: ConnectionProfile,
    #[serde(default)]
    pub channel: ChannelSettings,
    #[serde(default)]
    pub tables: TablesConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl FabricConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, PipelineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PipelineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &str) -> Result<Self, PipelineError> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, PipelineError> {
        toml::from_str(toml_str).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts, Duration::from_millis(self.retry.delay_ms))
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            max_batch: self.channel.max_batch,
            peek_timeout_ms: self.channel.peek_timeout_ms,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Channel
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    #[serde(default = "default_raw_topic")]
    pub raw_topic: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    #[serde(default = "default_timeout_ms")]
    pub consume_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub peek_timeout_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            raw_topic: default_raw_topic(),
            consumer_group: default_consumer_group(),
            partitions: default_partitions(),
            max_batch: default_max_batch(),
            consume_timeout_ms: default_timeout_ms(),
            peek_timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_raw_topic() -> String {
    "manufacturing.telemetry.raw".into()
}
fn default_consumer_group() -> String {
    "manufacturing-consumer-group".into()
}
fn default_partitions() -> u32 {
    1
}
fn default_max_batch() -> usize {
    100
}
fn default_timeout_ms() -> u64 {
    2000
}

// ═══════════════════════════════════════════════════════════════
//  Tables
// ═══════════════════════════════════════════════════════════════

/// Where one layer table lives: catalog identifier plus storage root.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableConfig {
    pub namespace: String,
    pub name: String,
    /// Storage root, e.g. `s3://silver-bucket/iceberg`.
    pub root: String,
}

impl TableConfig {
    fn new(namespace: &str, name: &str, root: &str) -> Self {
        Self { namespace: namespace.into(), name: name.into(), root: root.into() }
    }

    pub fn ident(&self) -> TableIdent {
        TableIdent::new(self.namespace.clone(), self.name.clone())
    }

    /// Bucket part of the root: `s3://silver-bucket/iceberg` → `silver-bucket`.
    pub fn bucket(&self) -> &str {
        let rest = self.root.split_once("://").map_or(self.root.as_str(), |(_, r)| r);
        rest.split('/').next().unwrap_or(rest)
    }

    /// `bucket.namespace.name`, as shown to users.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.bucket(), self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TablesConfig {
    #[serde(default = "default_cleansed")]
    pub cleansed: TableConfig,
    #[serde(default = "default_kpis")]
    pub kpis: TableConfig,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self { cleansed: default_cleansed(), kpis: default_kpis() }
    }
}

fn default_cleansed() -> TableConfig {
    TableConfig::new("telemetry", "cleansed", "s3://silver-bucket/iceberg")
}
fn default_kpis() -> TableConfig {
    TableConfig::new("manufacturing", "kpis", "s3://gold-bucket/iceberg")
}

// ═══════════════════════════════════════════════════════════════
//  Retry / Generator
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts(), delay_ms: default_delay_ms() }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 0 = seed from the clock.
    #[serde(default)]
    pub seed: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self { batch_size: default_batch_size(), seed: 0 }
    }
}

fn default_batch_size() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_demo_setup() {
        let cfg = FabricConfig::parse("").unwrap();
        assert_eq!(cfg.channel.raw_topic, "manufacturing.telemetry.raw");
        assert_eq!(cfg.channel.consumer_group, "manufacturing-consumer-group");
        assert_eq!(cfg.tables.cleansed.qualified_name(), "silver-bucket.telemetry.cleansed");
        assert_eq!(cfg.tables.kpis.qualified_name(), "gold-bucket.manufacturing.kpis");
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.generator.batch_size, 100);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = FabricConfig::parse(
            r#"
            [channel]
            consumer_group = "nightly"

            [tables.kpis]
            namespace = "plant"
            name = "rollups"
            root = "s3://archive/warehouse/"

            [generator]
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(cfg.channel.consumer_group, "nightly");
        assert_eq!(cfg.channel.max_batch, 100);
        assert_eq!(cfg.tables.kpis.bucket(), "archive");
        assert_eq!(cfg.tables.cleansed.name, "cleansed");
        assert_eq!(cfg.generator.seed, 42);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = FabricConfig::parse("[channel\nraw_topic = 1").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
