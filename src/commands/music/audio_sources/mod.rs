//! Turns a free-text query or a Spotify track link into something playable.
//!
//! Two seams sit behind the [`MetadataResolver`]: a [`TrackMetadataProvider`]
//! (Spotify) used to canonicalise track links and serve track searches, and a
//! [`SearchBackend`] (YouTube via `yt-dlp`) that produces the stream locator.

/// Spotify Web API client (client-credentials flow).
pub mod spotify;
/// Types shared by all resolution paths.
pub mod track_metadata;
/// `yt-dlp` backed search backend.
pub mod youtube;

use std::sync::Arc;

use serenity::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use spotify::{SpotifyApi, SpotifyTrack};
pub use track_metadata::{PlaybackRequest, TrackSummary};

/// Recoverable failures while resolving a query. None of these are fatal to the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The query looked like a track link but no track could be read from it.
    #[error("Could not parse track link: {0}")]
    LinkParse(String),

    /// The backend answered, but with nothing usable.
    #[error("No results found for `{0}`")]
    NoResults(String),

    /// Transport, process or decoding failure talking to an external service.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Metadata provider for track links and track searches.
#[async_trait]
pub trait TrackMetadataProvider: Send + Sync {
    /// Look up a single track by its provider id.
    async fn track(&self, track_id: &str) -> Result<SpotifyTrack, ResolutionError>;

    /// Return the best matching track for a free-text query, if any.
    async fn search_track(&self, query: &str) -> Result<Option<TrackSummary>, ResolutionError>;
}

/// Streaming search backend: text in, top hit's stream locator out.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<PlaybackRequest, ResolutionError>;
}

pub struct MetadataResolver {
    metadata: Arc<dyn TrackMetadataProvider>,
    search: Arc<dyn SearchBackend>,
}

impl MetadataResolver {
    pub fn new(metadata: Arc<dyn TrackMetadataProvider>, search: Arc<dyn SearchBackend>) -> Self {
        Self { metadata, search }
    }

    /// Resolve a query end to end: canonicalise track links, then search for audio.
    pub async fn resolve(&self, query: &str) -> Result<PlaybackRequest, ResolutionError> {
        let canonical = self.canonical_query(query).await?;
        self.find_audio(&canonical).await
    }

    /// Rewrite a Spotify track link into `"<track name> <primary artist>"`.
    ///
    /// Anything that is not a Spotify link is returned trimmed but otherwise verbatim.
    /// Every failure on the link path, including a failed lookup, is a `LinkParse`.
    pub async fn canonical_query(&self, query: &str) -> Result<String, ResolutionError> {
        let query = query.trim();
        if !SpotifyApi::is_spotify_link(query) {
            return Ok(query.to_string());
        }

        let track_id = SpotifyApi::extract_track_id(query)?;
        debug!("Looking up Spotify track {}", track_id);

        let track = self
            .metadata
            .track(&track_id)
            .await
            .map_err(|err| match err {
                ResolutionError::LinkParse(_) => err,
                other => ResolutionError::LinkParse(format!("{}: {}", track_id, other)),
            })?;

        let canonical = track.search_query();
        info!("Resolved Spotify track {} to `{}`", track_id, canonical);
        Ok(canonical)
    }

    /// Single best-effort search against the streaming backend.
    pub async fn find_audio(&self, query: &str) -> Result<PlaybackRequest, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::NoResults(String::new()));
        }
        self.search.search(query).await
    }

    /// Short-path track lookup used by the standalone search command.
    pub async fn search_track(&self, query: &str) -> Result<TrackSummary, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::NoResults(String::new()));
        }
        self.metadata
            .search_track(query)
            .await?
            .ok_or_else(|| ResolutionError::NoResults(query.to_string()))
    }
}
