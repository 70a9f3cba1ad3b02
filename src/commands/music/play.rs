use super::*;
use tracing::info;

/// Play a song from a search query or a Spotify track link
#[poise::command(prefix_command, slash_command, category = "Music")]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Song name or Spotify link"]
    #[rest]
    query: Option<String>,
) -> CommandResult {
    let query = query.unwrap_or_default();
    info!("Received play command with query: {}", query);

    // Resolving through Spotify and yt-dlp can outlast the interaction deadline
    ctx.defer().await?;

    dispatch(ctx, Command::Play, query).await
}
