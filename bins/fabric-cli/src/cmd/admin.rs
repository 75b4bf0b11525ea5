use pipeline::RunStatus;

use super::print_json;
use crate::config::Cli;
use crate::error::CliError;
use crate::state::Runtime;

pub async fn bootstrap(cli: &Cli) -> Result<(), CliError> {
    let rt = Runtime::open(cli)?;
    let report = pipeline::bootstrap(&rt.config, &rt.channel, &rt.provisioner).await;
    rt.save().await?;
    print_json(&report)?;
    if report.status == RunStatus::Error {
        tracing::warn!("bootstrap finished with errors");
    }
    Ok(())
}

pub async fn tables(cli: &Cli) -> Result<(), CliError> {
    let rt = Runtime::open(cli)?;
    print_json(&rt.store().list_tables().await)
}
