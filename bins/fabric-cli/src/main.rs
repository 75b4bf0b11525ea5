mod config;
mod error;
mod state;

use clap::Parser;
use config::{Cli, Commands};

mod cmd;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Bootstrap => cmd::admin::bootstrap(&cli).await,
        Commands::Run => cmd::run::run(&cli).await,
        Commands::Metrics(args) => cmd::topic::metrics(&cli, args).await,
        Commands::Peek(args) => cmd::topic::peek(&cli, args).await,
        Commands::Queue(args) => cmd::topic::queue(&cli, args).await,
        Commands::Tables => cmd::admin::tables(&cli).await,
        Commands::Scan(args) => cmd::table::scan(&cli, args).await,
        Commands::TableMetrics(args) => cmd::table::metrics(&cli, args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
