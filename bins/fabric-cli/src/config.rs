use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fabric", about = "Telemetry pipeline over a message channel and a versioned table store")]
pub struct Cli {
    /// Path to the TOML configuration file. Missing file = built-in demo setup.
    #[arg(long, global = true, default_value = "fabric.toml", env = "FABRIC_CONFIG")]
    pub config: String,

    /// JSON file holding broker and catalog state between invocations.
    #[arg(long, global = true, default_value = "fabric-state.json", env = "FABRIC_STATE")]
    pub state: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the raw topic and provision the layer tables
    Bootstrap,
    /// Run one ingest → cleanse → aggregate batch
    Run,
    /// Consumer-group lag and topic health
    Metrics(MetricsArgs),
    /// Most recent messages of a topic, no offsets touched
    Peek(PeekArgs),
    /// Messages a consumer group has not processed yet
    Queue(QueueArgs),
    /// List tables across all namespaces
    Tables,
    /// Rows of a table, newest first
    Scan(ScanArgs),
    /// Record and snapshot counts of a table
    TableMetrics(TableArgs),
}

#[derive(Args, Clone, Debug)]
pub struct MetricsArgs {
    /// Topic (default: configured raw topic)
    #[arg(long)]
    pub topic: Option<String>,
    /// Consumer group (default: configured group)
    #[arg(long)]
    pub group: Option<String>,
    /// Include latest / last-processed timestamps
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Args, Clone, Debug)]
pub struct PeekArgs {
    #[arg(long)]
    pub topic: Option<String>,
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Args, Clone, Debug)]
pub struct QueueArgs {
    #[arg(long)]
    pub topic: Option<String>,
    #[arg(long)]
    pub group: Option<String>,
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
}

#[derive(Args, Clone, Debug)]
pub struct ScanArgs {
    /// `namespace.table` or `bucket.namespace.table`
    pub table: String,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Clone, Debug)]
pub struct TableArgs {
    /// `namespace.table` or `bucket.namespace.table`
    pub table: String,
}
