//! Shared fakes for the integration tests: an in-memory voice layer, a
//! scriptable occupancy table, a reply recorder and mocks for the resolver seams.
#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use serenity::all::{ChannelId, GuildId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jukebox::Error;
use jukebox::commands::music::audio_sources::spotify::SpotifyTrack;
use jukebox::commands::music::audio_sources::{
    MetadataResolver, PlaybackRequest, ResolutionError, SearchBackend, TrackMetadataProvider,
    TrackSummary,
};
use jukebox::commands::music::utils::music_manager::{
    MusicError, MusicResult, PlaybackError, VoiceSessionManager,
};
use jukebox::commands::music::utils::voice_gateway::{
    ChannelOccupancy, FinishCallback, VoiceConnection, VoiceGateway,
};
use jukebox::commands::router::{CommandRouter, ReplySink};

pub const GUILD: GuildId = GuildId::new(1);
pub const OTHER_GUILD: GuildId = GuildId::new(2);
pub const VOICE: ChannelId = ChannelId::new(10);
pub const OTHER_VOICE: ChannelId = ChannelId::new(11);
pub const USER: UserId = UserId::new(100);
pub const BOT: UserId = UserId::new(999);

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Voice connection that records calls and fires the pending callback when stopped.
pub struct FakeConnection {
    log: EventLog,
    pending: Mutex<Option<FinishCallback>>,
    fail_play: Option<String>,
}

impl FakeConnection {
    /// Simulate the stream ending on its own.
    pub fn finish(&self, error: Option<PlaybackError>) {
        if let Some(callback) = self.pending.lock().unwrap().take() {
            callback(error);
        }
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(
        &self,
        source_locator: &str,
        on_finish: FinishCallback,
    ) -> Result<(), PlaybackError> {
        if let Some(reason) = &self.fail_play {
            self.log.lock().unwrap().push(format!("play-failed {}", source_locator));
            return Err(PlaybackError(reason.clone()));
        }
        self.log.lock().unwrap().push(format!("play {}", source_locator));
        *self.pending.lock().unwrap() = Some(on_finish);
        Ok(())
    }

    async fn stop(&self) {
        self.log.lock().unwrap().push("stop".to_string());
        self.finish(None);
    }

    async fn is_playing(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }
}

/// Voice gateway that hands out [`FakeConnection`]s.
#[derive(Default)]
pub struct FakeGateway {
    pub log: EventLog,
    joins: AtomicUsize,
    join_delay: Option<Duration>,
    join_error: Option<String>,
    fail_play: Option<String>,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_join_delay(mut self, delay: Duration) -> Self {
        self.join_delay = Some(delay);
        self
    }

    pub fn with_join_error(mut self, reason: &str) -> Self {
        self.join_error = Some(reason.to_string());
        self
    }

    pub fn with_play_error(mut self, reason: &str) -> Self {
        self.fail_play = Some(reason.to_string());
        self
    }

    pub fn join_count(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub fn last_connection(&self) -> Option<Arc<FakeConnection>> {
        self.connections.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> MusicResult<Arc<dyn VoiceConnection>> {
        self.joins.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.join_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.join_error {
            return Err(MusicError::Connection(reason.clone()));
        }

        self.log
            .lock()
            .unwrap()
            .push(format!("join {} {}", guild_id, channel_id));

        let connection = Arc::new(FakeConnection {
            log: self.log.clone(),
            pending: Mutex::new(None),
            fail_play: self.fail_play.clone(),
        });
        self.connections.lock().unwrap().push(connection.clone());
        Ok(connection)
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        self.log.lock().unwrap().push(format!("leave {}", guild_id));
        Ok(())
    }
}

/// Occupancy table; channels without an entry are unknown.
#[derive(Default)]
pub struct FakeOccupancy {
    members: Mutex<HashMap<(GuildId, ChannelId), usize>>,
}

impl FakeOccupancy {
    pub fn set(&self, guild_id: GuildId, channel_id: ChannelId, members: usize) {
        self.members
            .lock()
            .unwrap()
            .insert((guild_id, channel_id), members);
    }
}

impl ChannelOccupancy for FakeOccupancy {
    fn non_bot_members(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        self.members
            .lock()
            .unwrap()
            .get(&(guild_id, channel_id))
            .copied()
    }
}

/// Collects every reply a handler sends.
#[derive(Default)]
pub struct RecordingReplies {
    texts: Mutex<Vec<String>>,
}

impl RecordingReplies {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplySink for RecordingReplies {
    async fn send_text(&self, text: String) -> Result<(), Error> {
        self.texts.lock().unwrap().push(text);
        Ok(())
    }
}

mock! {
    pub Metadata {}

    #[async_trait]
    impl TrackMetadataProvider for Metadata {
        async fn track(&self, track_id: &str) -> Result<SpotifyTrack, ResolutionError>;
        async fn search_track(&self, query: &str) -> Result<Option<TrackSummary>, ResolutionError>;
    }
}

mock! {
    pub Search {}

    #[async_trait]
    impl SearchBackend for Search {
        async fn search(&self, query: &str) -> Result<PlaybackRequest, ResolutionError>;
    }
}

pub fn request(title: &str, source_locator: &str) -> PlaybackRequest {
    PlaybackRequest {
        title: title.to_string(),
        source_locator: source_locator.to_string(),
        webpage_url: None,
        duration: None,
    }
}

pub fn midnight_city() -> SpotifyTrack {
    SpotifyTrack {
        name: "Midnight City".to_string(),
        artists: vec!["M83".to_string()],
    }
}

pub fn session_manager(
    gateway: Arc<FakeGateway>,
    occupancy: Arc<FakeOccupancy>,
) -> Arc<VoiceSessionManager> {
    Arc::new(VoiceSessionManager::new(
        gateway,
        occupancy,
        Duration::from_secs(5),
    ))
}

pub fn resolver(metadata: MockMetadata, search: MockSearch) -> Arc<MetadataResolver> {
    Arc::new(MetadataResolver::new(Arc::new(metadata), Arc::new(search)))
}

pub fn router(
    sessions: Arc<VoiceSessionManager>,
    metadata: MockMetadata,
    search: MockSearch,
) -> CommandRouter {
    CommandRouter::new(sessions, resolver(metadata, search), "!")
}
