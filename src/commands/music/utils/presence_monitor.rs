//! Auto-disconnect when the bot's voice channel runs out of human listeners.

use serenity::all::{ChannelId, GuildId, UserId, VoiceState};
use std::sync::Arc;
use tracing::{debug, info};

use super::music_manager::VoiceSessionManager;
use super::voice_gateway::ChannelOccupancy;

/// The parts of a voice-state update the monitor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceStateChange {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub old_channel: Option<ChannelId>,
    pub new_channel: Option<ChannelId>,
}

impl VoiceStateChange {
    /// Build from a gateway update; `None` for updates outside of a guild.
    pub fn from_states(old: Option<&VoiceState>, new: &VoiceState) -> Option<Self> {
        let guild_id = new.guild_id.or_else(|| old.and_then(|state| state.guild_id))?;

        Some(Self {
            guild_id,
            user_id: new.user_id,
            old_channel: old.and_then(|state| state.channel_id),
            new_channel: new.channel_id,
        })
    }

    fn touches(&self, channel_id: ChannelId) -> bool {
        self.old_channel == Some(channel_id) || self.new_channel == Some(channel_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceOutcome {
    /// No session in the guild, or the change happened elsewhere.
    Ignored,
    /// The bot's channel still has listeners (or their number is unknown).
    StillOccupied,
    /// The bot left its now empty channel.
    Disconnected,
    /// The bot was removed from voice by someone else and its session was dropped.
    Forgotten,
}

pub struct PresenceMonitor {
    sessions: Arc<VoiceSessionManager>,
    occupancy: Arc<dyn ChannelOccupancy>,
    bot_user_id: UserId,
}

impl PresenceMonitor {
    pub fn new(
        sessions: Arc<VoiceSessionManager>,
        occupancy: Arc<dyn ChannelOccupancy>,
        bot_user_id: UserId,
    ) -> Self {
        Self {
            sessions,
            occupancy,
            bot_user_id,
        }
    }

    pub async fn on_voice_state_update(&self, change: &VoiceStateChange) -> PresenceOutcome {
        let guild_id = change.guild_id;
        let Some(mut bot_channel) = self.sessions.current_channel(guild_id).await else {
            return PresenceOutcome::Ignored;
        };

        if change.user_id == self.bot_user_id {
            match change.new_channel {
                None => {
                    if self.sessions.forget(guild_id).await {
                        info!(
                            "Bot was disconnected from channel {} in guild {}, session dropped",
                            bot_channel, guild_id
                        );
                        return PresenceOutcome::Forgotten;
                    }
                    return PresenceOutcome::Ignored;
                }
                Some(new_channel) if new_channel != bot_channel => {
                    if !self.sessions.relocate(guild_id, new_channel).await {
                        return PresenceOutcome::Ignored;
                    }
                    // The bot may have been dragged into an empty channel.
                    bot_channel = new_channel;
                }
                Some(_) => return PresenceOutcome::Ignored,
            }
        } else if !change.touches(bot_channel) {
            return PresenceOutcome::Ignored;
        }

        match self.occupancy.non_bot_members(guild_id, bot_channel) {
            Some(0) => {
                if self.sessions.disconnect_if_empty(guild_id, bot_channel).await {
                    PresenceOutcome::Disconnected
                } else {
                    PresenceOutcome::Ignored
                }
            }
            Some(count) => {
                debug!(
                    "{} listener(s) left in channel {} for guild {}",
                    count, bot_channel, guild_id
                );
                PresenceOutcome::StillOccupied
            }
            None => PresenceOutcome::StillOccupied,
        }
    }
}
