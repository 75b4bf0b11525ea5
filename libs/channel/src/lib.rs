pub mod client;
pub mod error;
pub mod lag;
pub mod memory;

pub use client::{ChannelClient, ChannelConfig, ChannelMessage, ConsumeBatch, Produced};
pub use error::ChannelError;
pub use lag::{DetailedTopicMetrics, LagEngine, PartitionLag, TopicMetrics};
pub use memory::{BrokerSnapshot, MemoryBroker, MemoryBrokerConfig};
