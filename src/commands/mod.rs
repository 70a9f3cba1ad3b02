//! This module aggregates all the command modules for the bot.

use serenity::async_trait;

use crate::commands::music::utils::voice_gateway::CacheOccupancy;
use crate::commands::router::{Command, CommandInvocation, ReplySink};
use crate::{CommandResult, Context, Data, Error};

/// General purpose commands (e.g., ping).
pub mod general;
/// Reply texts shared by every command.
pub mod messages;
/// Commands related to music playback.
pub mod music;
/// Framework independent command dispatch.
pub mod router;

#[async_trait]
impl ReplySink for Context<'_> {
    async fn send_text(&self, text: String) -> Result<(), Error> {
        poise::Context::say(*self, text).await?;
        Ok(())
    }
}

/// Describe the invoking user for the router and hand the command over to it.
pub(crate) async fn dispatch(ctx: Context<'_>, command: Command, args: String) -> CommandResult {
    let guild_id = ctx.guild_id();
    let user_id = ctx.author().id;
    let voice_channel = guild_id.and_then(|guild_id| {
        CacheOccupancy::user_voice_channel(&ctx.serenity_context().cache, guild_id, user_id)
    });

    let invocation = CommandInvocation {
        guild_id,
        user_id,
        voice_channel,
        args,
    };

    ctx.data().router.dispatch(command, &invocation, &ctx).await
}

/// Every command the framework registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        crate::register(),
        crate::help(),
        general::ping::ping(),
        music::play::play(),
        music::spotify::spotify(),
        music::stop::stop(),
    ]
}
