use poise::serenity_prelude as serenity;
use tracing::{debug, info};

use crate::commands::music::utils::presence_monitor::{PresenceOutcome, VoiceStateChange};
use crate::{Data, Error};

/// Framework level gateway events. Commands are dispatched by poise itself.
pub async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::VoiceStateUpdate { old, new } = event {
        let Some(change) = VoiceStateChange::from_states(old.as_ref(), new) else {
            return Ok(());
        };

        match data.presence.on_voice_state_update(&change).await {
            PresenceOutcome::Disconnected => info!(
                "Left empty voice channel in guild {}",
                change.guild_id
            ),
            PresenceOutcome::Forgotten => info!(
                "Dropped voice session for guild {} after external disconnect",
                change.guild_id
            ),
            outcome => debug!(
                "Voice state update for user {} in guild {}: {:?}",
                change.user_id, change.guild_id, outcome
            ),
        }
    }

    Ok(())
}
