//! The narrow interface between the session manager and the voice/cache layers,
//! plus their songbird and serenity-cache implementations.

use serenity::all::{Cache, ChannelId, Context, GuildId, UserId, VoiceState};
use serenity::async_trait;
use serenity::prelude::Mutex as SerenityMutex;
use songbird::input::HttpRequest;
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Call, Event, Songbird, TrackEvent};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::event_handlers::FinishNotifier;
use super::music_manager::{MusicError, MusicResult, PlaybackError};

/// Invoked once when a playback ends: `None` on a clean finish (or stop), `Some` on error.
pub type FinishCallback = Box<dyn FnOnce(Option<PlaybackError>) + Send + 'static>;

/// Opens and closes voice connections.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>>;

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()>;
}

/// A live voice connection able to stream one source at a time.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Start streaming `source_locator`.
    ///
    /// On `Ok`, `on_finish` will be called exactly once. On `Err` it is dropped uncalled.
    async fn play(&self, source_locator: &str, on_finish: FinishCallback)
    -> Result<(), PlaybackError>;

    async fn stop(&self);

    async fn is_playing(&self) -> bool;
}

/// Counts who is sitting in a voice channel.
pub trait ChannelOccupancy: Send + Sync {
    /// Non-bot members in the channel, or `None` when the guild state is unknown.
    fn non_bot_members(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize>;
}

pub struct SongbirdGateway {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdGateway {
    pub fn new(songbird: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { songbird, http }
    }

    /// Get the Songbird voice client registered on the serenity client.
    pub async fn from_context(ctx: &Context, http: reqwest::Client) -> MusicResult<Self> {
        let songbird = songbird::get(ctx).await.ok_or(MusicError::NoVoiceManager)?;
        Ok(Self::new(songbird, http))
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        let call = self
            .songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| MusicError::Connection(e.to_string()))?;

        Ok(Arc::new(SongbirdConnection::new(guild_id, call, self.http.clone())))
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        if self.songbird.get(guild_id).is_none() {
            return Err(MusicError::NotConnected);
        }

        self.songbird
            .remove(guild_id)
            .await
            .map_err(|e| MusicError::Connection(format!("Failed to leave voice channel: {}", e)))
    }
}

pub struct SongbirdConnection {
    guild_id: GuildId,
    call: Arc<SerenityMutex<Call>>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdConnection {
    pub fn new(guild_id: GuildId, call: Arc<SerenityMutex<Call>>, http: reqwest::Client) -> Self {
        Self {
            guild_id,
            call,
            http,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(
        &self,
        source_locator: &str,
        on_finish: FinishCallback,
    ) -> Result<(), PlaybackError> {
        let input = HttpRequest::new(self.http.clone(), source_locator.to_string());

        let handle = {
            let mut call = self.call.lock().await;
            call.stop();
            call.play_input(input.into())
        };

        let notifier = FinishNotifier::new(self.guild_id, on_finish);
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                notifier.disarm().await;
                let _ = handle.stop();
                return Err(PlaybackError(format!("Failed to watch track: {}", e)));
            }
        }

        *self.current.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        self.call.lock().await.stop();
        self.current.lock().await.take();
    }

    async fn is_playing(&self) -> bool {
        let current = self.current.lock().await;
        let Some(handle) = current.as_ref() else {
            return false;
        };

        match handle.get_info().await {
            Ok(state) => matches!(state.playing, PlayMode::Play),
            Err(e) => {
                debug!("Track in guild {} is no longer alive: {}", self.guild_id, e);
                false
            }
        }
    }
}

/// Channel occupancy read from the serenity cache.
pub struct CacheOccupancy {
    cache: Arc<Cache>,
}

impl CacheOccupancy {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }

    fn is_bot(&self, state: &VoiceState) -> bool {
        state
            .member
            .as_ref()
            .map(|member| member.user.bot)
            .or_else(|| self.cache.user(state.user_id).map(|user| user.bot))
            .unwrap_or(false)
    }

    /// The voice channel a user currently sits in, if the guild is cached.
    pub fn user_voice_channel(
        cache: &Cache,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Option<ChannelId> {
        let guild = cache.guild(guild_id)?;
        guild.voice_states.get(&user_id)?.channel_id
    }
}

impl ChannelOccupancy for CacheOccupancy {
    fn non_bot_members(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        let guild = self.cache.guild(guild_id)?;

        let count = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .filter(|state| !self.is_bot(state))
            .count();

        Some(count)
    }
}
