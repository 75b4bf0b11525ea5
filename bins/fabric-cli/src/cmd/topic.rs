use std::time::Duration;

use crate::config::{Cli, MetricsArgs, PeekArgs, QueueArgs};
use crate::error::CliError;
use crate::state::Runtime;

use super::print_json;

pub async fn metrics(cli: &Cli, args: &MetricsArgs) -> Result<(), CliError> {
    let rt = Runtime::open(cli)?;
    let topic = args.topic.as_deref().unwrap_or(&rt.config.channel.raw_topic);
    let group = args.group.as_deref().unwrap_or(&rt.config.channel.consumer_group);
    let engine = rt.lag_engine();
    if args.detailed {
        print_json(&engine.detailed_metrics(topic, group).await)
    } else {
        print_json(&engine.topic_metrics(topic, group).await)
    }
}

pub async fn peek(cli: &Cli, args: &PeekArgs) -> Result<(), CliError> {
    let rt = Runtime::open(cli)?;
    let topic = args.topic.as_deref().unwrap_or(&rt.config.channel.raw_topic);
    let timeout = Duration::from_millis(rt.config.channel.peek_timeout_ms);
    print_json(&rt.channel.peek(topic, args.limit, timeout).await)
}

pub async fn queue(cli: &Cli, args: &QueueArgs) -> Result<(), CliError> {
    let rt = Runtime::open(cli)?;
    let topic = args.topic.as_deref().unwrap_or(&rt.config.channel.raw_topic);
    let group = args.group.as_deref().unwrap_or(&rt.config.channel.consumer_group);
    print_json(&rt.channel.peek_unprocessed(topic, group, args.limit).await)
}
