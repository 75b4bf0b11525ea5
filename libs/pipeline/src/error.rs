use fabric_api::FabricError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

impl PipelineError {
    /// Add context to the error.
    ///
    /// For `Fabric`, context goes to the inner error so its kind survives.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            PipelineError::Fabric(e) => PipelineError::Fabric(e.with_context(ctx)),
            PipelineError::Config(msg) => PipelineError::Config(format!("{ctx}: {msg}")),
        }
    }
}
