use fabric_api::TableIdent;

use crate::config::{Cli, ScanArgs, TableArgs};
use crate::error::CliError;
use crate::state::Runtime;

use super::print_json;

pub async fn scan(cli: &Cli, args: &ScanArgs) -> Result<(), CliError> {
    let ident = TableIdent::parse(&args.table)?;
    let rt = Runtime::open(cli)?;
    let handle = rt.store().load_table(&ident).await?;
    print_json(&rt.store().scan(&handle, args.limit).await)
}

pub async fn metrics(cli: &Cli, args: &TableArgs) -> Result<(), CliError> {
    let ident = TableIdent::parse(&args.table)?;
    let rt = Runtime::open(cli)?;
    let handle = rt.store().load_table(&ident).await?;
    print_json(&rt.store().metrics(&handle).await?)
}
