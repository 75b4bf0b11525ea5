#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("state file ({context}) '{path}': {detail}")]
    State { context: &'static str, path: String, detail: String },

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("{0}")]
    Fabric(#[from] fabric_api::FabricError),

    #[error("output: {0}")]
    Output(#[from] serde_json::Error),
}
