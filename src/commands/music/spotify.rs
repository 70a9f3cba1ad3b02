use super::*;

/// Look up a track on Spotify
#[poise::command(prefix_command, slash_command, category = "Music")]
pub async fn spotify(
    ctx: Context<'_>,
    #[description = "Search text"]
    #[rest]
    query: Option<String>,
) -> CommandResult {
    dispatch(ctx, Command::Spotify, query.unwrap_or_default()).await
}
