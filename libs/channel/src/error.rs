use fabric_api::FabricError;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    #[error("partition {partition} of topic '{topic}' not found")]
    PartitionNotFound { topic: String, partition: u32 },

    #[error("read session {0} is not open")]
    SessionClosed(u64),

    #[error("broker unavailable")]
    Unavailable,

    #[error("commit rejected for group '{0}'")]
    CommitRejected(String),
}

impl ChannelError {
    /// Convert to FabricError with the matching ErrorKind.
    pub fn into_fabric_error(self) -> FabricError {
        let msg = self.to_string();
        match self {
            ChannelError::TopicNotFound(_) | ChannelError::PartitionNotFound { .. } => {
                FabricError::not_found(msg)
            }
            ChannelError::SessionClosed(_) => FabricError::logic(msg),
            ChannelError::Unavailable | ChannelError::CommitRejected(_) => {
                FabricError::connectivity(msg)
            }
        }
    }
}

impl From<ChannelError> for FabricError {
    fn from(e: ChannelError) -> Self {
        e.into_fabric_error()
    }
}
