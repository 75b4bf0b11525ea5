use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use channel::{BrokerSnapshot, ChannelClient, LagEngine, MemoryBroker, MemoryBrokerConfig};
use pipeline::{FabricConfig, Pipeline, PipelineSettings, ProfileCache, ProfileCredentials};
use table_store::{CatalogSnapshot, MemoryCatalog, TableProvisioner, TableStore};

use crate::config::Cli;
use crate::error::CliError;

/// Broker and catalog state persisted between invocations.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    broker: BrokerSnapshot,
    #[serde(default)]
    catalog: CatalogSnapshot,
}

/// Everything a command needs, wired from config and state file.
pub struct Runtime {
    pub config: FabricConfig,
    pub channel: ChannelClient,
    pub provisioner: TableProvisioner,
    broker: Arc<MemoryBroker>,
    catalog: Arc<MemoryCatalog>,
    state_path: String,
}

impl Runtime {
    pub fn open(cli: &Cli) -> Result<Self, CliError> {
        let config = FabricConfig::load_or_default(&cli.config)?;
        let state = load_state(&cli.state)?;

        ProfileCache::global().init(config.profile.clone());

        let broker = Arc::new(MemoryBroker::from_snapshot(MemoryBrokerConfig::default(), state.broker));
        let catalog = Arc::new(MemoryCatalog::from_snapshot(state.catalog));
        let store = TableStore::new(
            catalog.clone(),
            Arc::new(ProfileCredentials::new(ProfileCache::global())),
            config.retry_policy(),
        );
        let channel = ChannelClient::new(broker.clone(), config.channel_config());

        Ok(Self {
            provisioner: TableProvisioner::new(store),
            channel,
            broker,
            catalog,
            config,
            state_path: cli.state.clone(),
        })
    }

    pub fn store(&self) -> &TableStore {
        self.provisioner.store()
    }

    pub fn lag_engine(&self) -> LagEngine {
        LagEngine::new(self.channel.clone())
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.channel.clone(),
            self.provisioner.clone(),
            PipelineSettings::from_config(&self.config),
        )
    }

    /// Write broker and catalog state back to the state file.
    pub async fn save(&self) -> Result<(), CliError> {
        let state = StateFile {
            broker: self.broker.snapshot().await,
            catalog: self.catalog.snapshot().await,
        };
        let bytes = serde_json::to_vec(&state)?;
        std::fs::write(&self.state_path, bytes).map_err(|e| CliError::State {
            context: "write",
            path: self.state_path.clone(),
            detail: e.to_string(),
        })?;
        tracing::debug!(path = %self.state_path, "state saved");
        Ok(())
    }
}

fn load_state(path: &str) -> Result<StateFile, CliError> {
    if !Path::new(path).exists() {
        tracing::debug!(path = %path, "no state file, starting empty");
        return Ok(StateFile::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| CliError::State {
        context: "read",
        path: path.to_string(),
        detail: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| CliError::State {
        context: "parse",
        path: path.to_string(),
        detail: e.to_string(),
    })
}
