pub mod admin;
pub mod run;
pub mod table;
pub mod topic;

use serde::Serialize;

use crate::error::CliError;

/// Pretty JSON to stdout.
fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
