use std::sync::{Arc, LazyLock};

use poise::serenity_prelude as serenity;

pub mod commands;
pub mod config;
pub mod events;

use commands::music::audio_sources::{MetadataResolver, spotify::SpotifyApi, youtube::YoutubeApi};
use commands::music::utils::{
    music_manager::VoiceSessionManager,
    presence_monitor::PresenceMonitor,
    voice_gateway::{CacheOccupancy, ChannelOccupancy, SongbirdGateway},
};
use commands::router::CommandRouter;
use config::BotConfig;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type CommandResult = Result<(), Error>;

/// Shared HTTP client for the Spotify API and songbird's stream inputs.
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(reqwest::Client::new);

/// User data, stored and accessible in all command invocations and framework events.
pub struct Data {
    pub router: CommandRouter,
    pub presence: PresenceMonitor,
}

impl Data {
    /// Wire the voice session manager, resolver and presence monitor against the live client.
    pub async fn from_config(
        ctx: &serenity::Context,
        bot_user_id: serenity::UserId,
        config: &BotConfig,
    ) -> Result<Self, Error> {
        let gateway = SongbirdGateway::from_context(ctx, HTTP_CLIENT.clone()).await?;
        let occupancy: Arc<dyn ChannelOccupancy> =
            Arc::new(CacheOccupancy::new(ctx.cache.clone()));

        let sessions = Arc::new(VoiceSessionManager::new(
            Arc::new(gateway),
            occupancy.clone(),
            config.connect_timeout,
        ));

        let resolver = Arc::new(MetadataResolver::new(
            Arc::new(SpotifyApi::new(HTTP_CLIENT.clone(), config.spotify.clone())),
            Arc::new(YoutubeApi::new(config.ytdlp_path.clone())),
        ));

        Ok(Self {
            router: CommandRouter::new(sessions.clone(), resolver, config.command_prefix.clone()),
            presence: PresenceMonitor::new(sessions, occupancy, bot_user_id),
        })
    }
}

#[poise::command(prefix_command, slash_command, category = "General")]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Specific command to show help about"]
    #[autocomplete = "poise::builtins::autocomplete_command"]
    command: Option<String>,
) -> CommandResult {
    poise::builtins::help(
        ctx,
        command.as_deref(),
        poise::builtins::HelpConfiguration {
            show_context_menu_commands: true,
            ..Default::default()
        },
    )
    .await
    .map_err(|e| e.into())
}

#[poise::command(prefix_command, hide_in_help)]
pub async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx)
        .await
        .map_err(|e| e.into())
}
