use crate::config::Cli;
use crate::error::CliError;
use crate::state::Runtime;

use super::print_json;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    let rt = Runtime::open(cli)?;
    let run = rt
        .pipeline()
        .run_with_progress(|report| eprintln!("[{}] {}", report.stage, report.detail))
        .await;
    rt.save().await?;
    print_json(&run)
}
