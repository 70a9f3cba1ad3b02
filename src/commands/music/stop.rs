use super::*;

/// Stop the music and leave the voice channel
#[poise::command(prefix_command, slash_command, category = "Music")]
pub async fn stop(ctx: Context<'_>) -> CommandResult {
    dispatch(ctx, Command::Stop, String::new()).await
}
