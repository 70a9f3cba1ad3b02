use dashmap::DashMap;
use serenity::all::{ChannelId, GuildId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::commands::music::audio_sources::PlaybackRequest;

use super::voice_gateway::{ChannelOccupancy, FinishCallback, VoiceConnection, VoiceGateway};

/// Errors that can occur during music operations
#[derive(Error, Debug)]
pub enum MusicError {
    #[error("Failed to join voice channel: {0}")]
    Connection(String),

    #[error("Timed out after {0:?} joining voice channel")]
    ConnectTimeout(Duration),

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("Failed to get voice manager")]
    NoVoiceManager,

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl MusicError {
    /// Voice join or permission failure, including a join that never completed.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectTimeout(_))
    }
}

/// Playback failure after the stream was handed to the voice layer. Logged, never shown to users.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Playback error: {0}")]
pub struct PlaybackError(pub String);

/// Result type for music operations
pub type MusicResult<T> = Result<T, MusicError>;

/// The bot's live connection to one voice channel within a guild.
#[derive(Clone)]
pub struct GuildVoiceSession {
    guild_id: GuildId,
    channel_id: ChannelId,
    connection: Arc<dyn VoiceConnection>,
}

impl GuildVoiceSession {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn connection(&self) -> &Arc<dyn VoiceConnection> {
        &self.connection
    }
}

impl fmt::Debug for GuildVoiceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildVoiceSession")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

// The slot mutex is held for the whole of every mutating operation on a guild.
type SessionSlot = Arc<Mutex<Option<GuildVoiceSession>>>;

/// Owns at most one voice session per guild.
pub struct VoiceSessionManager {
    gateway: Arc<dyn VoiceGateway>,
    occupancy: Arc<dyn ChannelOccupancy>,
    connect_timeout: Duration,
    sessions: DashMap<GuildId, SessionSlot>,
}

impl VoiceSessionManager {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        occupancy: Arc<dyn ChannelOccupancy>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            occupancy,
            connect_timeout,
            sessions: DashMap::new(),
        }
    }

    fn slot(&self, guild_id: GuildId) -> SessionSlot {
        self.sessions.entry(guild_id).or_default().clone()
    }

    fn existing_slot(&self, guild_id: GuildId) -> Option<SessionSlot> {
        self.sessions.get(&guild_id).map(|slot| slot.value().clone())
    }

    fn is_registered(&self, guild_id: GuildId, slot: &SessionSlot) -> bool {
        self.sessions
            .get(&guild_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), slot))
    }

    /// Drop an emptied slot from the map. Must be called with the slot locked.
    fn release_slot(&self, guild_id: GuildId, slot: &SessionSlot) {
        self.sessions
            .remove_if(&guild_id, |_, registered| Arc::ptr_eq(registered, slot));
    }

    /// Return the guild's session, joining `channel_id` first if there is none.
    ///
    /// An existing session is returned unchanged, even when it sits in another channel.
    pub async fn ensure_connected(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<GuildVoiceSession> {
        let (slot, mut current) = loop {
            let slot = self.slot(guild_id);
            let current = slot.clone().lock_owned().await;
            // A teardown may have unregistered the slot while we waited for it.
            if self.is_registered(guild_id, &slot) {
                break (slot, current);
            }
        };

        if let Some(existing) = current.as_ref() {
            debug!(
                "Reusing voice session in channel {} for guild {}",
                existing.channel_id, guild_id
            );
            return Ok(existing.clone());
        }

        info!("Joining voice channel {} in guild {}", channel_id, guild_id);
        let joined =
            tokio::time::timeout(self.connect_timeout, self.gateway.join(guild_id, channel_id))
                .await;

        let connection = match joined {
            Ok(Ok(connection)) => connection,
            Ok(Err(err)) => {
                warn!(
                    "Failed to join voice channel {} for guild {}: {}",
                    channel_id, guild_id, err
                );
                self.release_quietly(guild_id).await;
                self.release_slot(guild_id, &slot);
                return Err(match err {
                    MusicError::Connection(_) | MusicError::ConnectTimeout(_) => err,
                    other => MusicError::Connection(other.to_string()),
                });
            }
            Err(_) => {
                warn!(
                    "Joining voice channel {} for guild {} timed out after {:?}",
                    channel_id, guild_id, self.connect_timeout
                );
                self.release_quietly(guild_id).await;
                self.release_slot(guild_id, &slot);
                return Err(MusicError::ConnectTimeout(self.connect_timeout));
            }
        };

        let session = GuildVoiceSession {
            guild_id,
            channel_id,
            connection,
        };
        *current = Some(session.clone());

        Ok(session)
    }

    /// Replace whatever the session is streaming with `request`.
    ///
    /// `on_finish` fires exactly once when the new playback ends or errors. If starting
    /// playback fails, or `session` is no longer the guild's live session, the error is
    /// returned and `on_finish` is never called.
    pub async fn play(
        &self,
        session: &GuildVoiceSession,
        request: &PlaybackRequest,
        on_finish: FinishCallback,
    ) -> MusicResult<()> {
        let slot = self
            .existing_slot(session.guild_id)
            .ok_or(MusicError::NotConnected)?;
        let current = slot.lock().await;
        let active = current
            .as_ref()
            .filter(|active| same_connection(&active.connection, &session.connection))
            .ok_or(MusicError::NotConnected)?;

        active.connection.stop().await;
        active
            .connection
            .play(&request.source_locator, on_finish)
            .await?;

        info!(
            "Now playing `{}` in channel {} for guild {}",
            request.title, active.channel_id, active.guild_id
        );
        Ok(())
    }

    /// Halt playback, leave the channel and forget the session.
    pub async fn stop_and_disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        let slot = self.existing_slot(guild_id).ok_or(MusicError::NotConnected)?;
        let mut current = slot.lock().await;
        let session = current.take().ok_or(MusicError::NotConnected)?;
        self.release_slot(guild_id, &slot);

        self.teardown(session).await;
        info!("Stopped playback and disconnected in guild {}", guild_id);
        Ok(())
    }

    /// Tear the session down if it sits in `channel_id` and no non-bot member is left there.
    ///
    /// Returns whether a teardown happened. Unknown occupancy never disconnects.
    pub async fn disconnect_if_empty(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let Some(slot) = self.existing_slot(guild_id) else {
            return false;
        };
        let mut current = slot.lock().await;

        if current.as_ref().map(|s| s.channel_id) != Some(channel_id) {
            return false;
        }

        match self.occupancy.non_bot_members(guild_id, channel_id) {
            Some(0) => {}
            Some(count) => {
                debug!(
                    "Channel {} in guild {} still has {} listener(s)",
                    channel_id, guild_id, count
                );
                return false;
            }
            None => {
                debug!(
                    "Occupancy of channel {} in guild {} is unknown",
                    channel_id, guild_id
                );
                return false;
            }
        }

        let Some(session) = current.take() else {
            return false;
        };
        self.release_slot(guild_id, &slot);
        self.teardown(session).await;
        info!(
            "Auto-disconnected from channel {} in guild {} (empty)",
            channel_id, guild_id
        );
        true
    }

    /// Record that the bot was moved to `channel_id` by someone else.
    ///
    /// Returns whether the guild had a session to update.
    pub async fn relocate(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let Some(slot) = self.existing_slot(guild_id) else {
            return false;
        };
        let mut current = slot.lock().await;
        let Some(session) = current.as_mut() else {
            return false;
        };

        if session.channel_id != channel_id {
            info!(
                "Bot moved from channel {} to {} in guild {}",
                session.channel_id, channel_id, guild_id
            );
            session.channel_id = channel_id;
        }
        true
    }

    /// Drop the session after the bot was disconnected from voice by someone else.
    pub async fn forget(&self, guild_id: GuildId) -> bool {
        let Some(slot) = self.existing_slot(guild_id) else {
            return false;
        };
        let mut current = slot.lock().await;
        let Some(session) = current.take() else {
            return false;
        };
        self.release_slot(guild_id, &slot);

        self.teardown(session).await;
        true
    }

    pub async fn current_session(&self, guild_id: GuildId) -> Option<GuildVoiceSession> {
        let slot = self.existing_slot(guild_id)?;
        let current = slot.lock().await;
        current.clone()
    }

    pub async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.current_session(guild_id)
            .await
            .map(|session| session.channel_id)
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        self.current_channel(guild_id).await.is_some()
    }

    /// Number of guilds with a live session.
    pub async fn session_count(&self) -> usize {
        let slots: Vec<SessionSlot> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    async fn teardown(&self, session: GuildVoiceSession) {
        if session.connection.is_playing().await {
            session.connection.stop().await;
        }

        if let Err(e) = self.gateway.leave(session.guild_id).await {
            // The record is gone either way; a failed leave only leaves a stale call behind.
            warn!(
                "Failed to leave voice channel {} in guild {}: {}",
                session.channel_id, session.guild_id, e
            );
        }
    }

    async fn release_quietly(&self, guild_id: GuildId) {
        if let Err(e) = self.gateway.leave(guild_id).await {
            debug!("Nothing to release for guild {}: {}", guild_id, e);
        }
    }
}

fn same_connection(a: &Arc<dyn VoiceConnection>, b: &Arc<dyn VoiceConnection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SilentConnection;

    #[async_trait]
    impl VoiceConnection for SilentConnection {
        async fn play(&self, _locator: &str, _on_finish: FinishCallback) -> Result<(), PlaybackError> {
            Ok(())
        }

        async fn stop(&self) {}

        async fn is_playing(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct CountingGateway {
        joins: AtomicUsize,
    }

    #[async_trait]
    impl VoiceGateway for CountingGateway {
        async fn join(&self, _guild: GuildId, _channel: ChannelId) -> MusicResult<Arc<dyn VoiceConnection>> {
            self.joins.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(SilentConnection))
        }

        async fn leave(&self, _guild: GuildId) -> MusicResult<()> {
            Ok(())
        }
    }

    struct Empty;

    impl ChannelOccupancy for Empty {
        fn non_bot_members(&self, _guild: GuildId, _channel: ChannelId) -> Option<usize> {
            Some(0)
        }
    }

    fn manager(gateway: Arc<CountingGateway>) -> VoiceSessionManager {
        VoiceSessionManager::new(gateway, Arc::new(Empty), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_teardowns_release_guild_slots() {
        let sessions = manager(Arc::default());

        for guild in 1..=3 {
            sessions
                .ensure_connected(GuildId::new(guild), ChannelId::new(10))
                .await
                .unwrap();
        }
        assert_eq!(sessions.sessions.len(), 3);

        sessions.stop_and_disconnect(GuildId::new(1)).await.unwrap();
        assert!(sessions.disconnect_if_empty(GuildId::new(2), ChannelId::new(10)).await);
        assert!(sessions.forget(GuildId::new(3)).await);

        assert!(sessions.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_after_slot_release() {
        let gateway = Arc::new(CountingGateway::default());
        let sessions = manager(gateway.clone());
        let guild = GuildId::new(1);

        sessions.ensure_connected(guild, ChannelId::new(10)).await.unwrap();
        sessions.stop_and_disconnect(guild).await.unwrap();
        let session = sessions.ensure_connected(guild, ChannelId::new(11)).await.unwrap();

        assert_eq!(session.channel_id(), ChannelId::new(11));
        assert_eq!(gateway.joins.load(Ordering::SeqCst), 2);
        assert_eq!(sessions.sessions.len(), 1);
    }
}
