use poise::serenity_prelude as serenity;
use std::time::Duration;
use tracing::debug;

use crate::commands::{dispatch, router::Command};
use crate::{CommandResult, Context};

/// Ping the bot to check that it responds
#[poise::command(prefix_command, slash_command, category = "General")]
pub async fn ping(ctx: Context<'_>) -> CommandResult {
    match get_shard_latency(&ctx).await {
        Some(latency) => debug!("Shard latency: {} ms", latency.as_millis()),
        None => debug!("Shard latency not measured yet"),
    }

    dispatch(ctx, Command::Ping, String::new()).await
}

async fn get_shard_latency(ctx: &Context<'_>) -> Option<Duration> {
    let shard_manager = ctx.framework().shard_manager();
    let runners = shard_manager.runners.lock().await;

    // The runner for the shard this command arrived on
    let runner = runners.get(&serenity::ShardId(ctx.serenity_context().shard_id.0))?;

    runner.latency
}
