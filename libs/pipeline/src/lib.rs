pub mod aggregate;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod profile;
pub mod schemas;
pub mod validate;

pub use aggregate::{Kpi, aggregate};
pub use bootstrap::{BootstrapReport, TableResult, TopicResult, bootstrap};
pub use config::{ChannelSettings, FabricConfig, GeneratorConfig, RetryConfig, TableConfig, TablesConfig};
pub use error::PipelineError;
pub use generator::SensorGenerator;
pub use orchestrator::{
    Pipeline, PipelineRun, PipelineSettings, RunStatus, RunSummary, Stage, StageReport, StageStatus,
};
pub use profile::{ConnectionProfile, ProfileCache, ProfileCredentials};
pub use validate::{Cleansed, Violation, check, cleanse, validate};
