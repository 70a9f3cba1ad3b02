//! Spotify Web API access: track-link parsing, client-credentials authentication,
//! single-track lookup and track search.

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use regex::Regex;
use reqwest::header;
use serde::Deserialize;
use serenity::async_trait;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::config::SpotifyCredentials;

use super::{ResolutionError, TrackMetadataProvider, TrackSummary};

pub const SPOTIFY_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
pub const SPOTIFY_API_URL: &str = "https://api.spotify.com";

/// Result type specific to Spotify API operations.
pub type SpotifyResult<T> = Result<T, ResolutionError>;

/// Basic track information retrieved from Spotify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpotifyTrack {
    /// The name of the track.
    pub name: String,
    /// Artist names, primary artist first.
    pub artists: Vec<String>,
}

impl SpotifyTrack {
    /// `"<track name> <primary artist>"`, or just the name when no artist is listed.
    pub fn search_query(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", self.name, artist),
            None => self.name.clone(),
        }
    }
}

/// Response from Spotify's token endpoint.
#[derive(Debug, Deserialize)]
struct SpotifyToken {
    access_token: String,
    expires_in: u64,
    /// When the token was received, used to check expiry.
    #[serde(skip, default = "Instant::now")]
    created_at: Instant,
}

impl SpotifyToken {
    /// Considered expired 30 seconds before its actual expiry.
    fn is_expired(&self) -> bool {
        let expiry = Duration::from_secs(self.expires_in);
        self.created_at.elapsed() > expiry.saturating_sub(Duration::from_secs(30))
    }
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<Option<TrackObject>>,
}

impl From<TrackObject> for SpotifyTrack {
    fn from(track: TrackObject) -> Self {
        Self {
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
        }
    }
}

impl From<TrackObject> for TrackSummary {
    fn from(track: TrackObject) -> Self {
        let url = track
            .external_urls
            .spotify
            .or_else(|| {
                track
                    .id
                    .as_ref()
                    .map(|id| format!("https://open.spotify.com/track/{}", id))
            })
            .unwrap_or_default();

        Self {
            title: track.name,
            artist: track
                .artists
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_else(|| "Unknown Artist".to_string()),
            url,
        }
    }
}

/// Matches `spotify:track:<id>` URIs.
static SPOTIFY_TRACK_URI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^spotify:track:([a-zA-Z0-9]+)$").unwrap());

pub struct SpotifyApi {
    client: reqwest::Client,
    credentials: SpotifyCredentials,
    accounts_url: String,
    api_url: String,
    /// Cached access token, refreshed on expiry.
    token: Mutex<Option<SpotifyToken>>,
}

impl SpotifyApi {
    pub fn new(client: reqwest::Client, credentials: SpotifyCredentials) -> Self {
        Self {
            client,
            credentials,
            accounts_url: SPOTIFY_ACCOUNTS_URL.to_string(),
            api_url: SPOTIFY_API_URL.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Point the client at other endpoints (used against mock servers).
    pub fn with_base_urls(
        mut self,
        accounts_url: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Self {
        self.accounts_url = accounts_url.into();
        self.api_url = api_url.into();
        self
    }

    /// Whether the query should be treated as a Spotify link rather than search text.
    pub fn is_spotify_link(query: &str) -> bool {
        query.contains("open.spotify.com") || query.starts_with("spotify:")
    }

    /// Extract the track id from a track link, ignoring query parameters and fragments.
    ///
    /// Accepts `open.spotify.com/track/<id>` (with or without scheme, with an optional
    /// locale segment such as `/intl-de/`) and `spotify:track:<id>`.
    pub fn extract_track_id(link: &str) -> SpotifyResult<String> {
        let link = link.trim();

        if let Some(captures) = SPOTIFY_TRACK_URI_REGEX.captures(link) {
            return Ok(captures[1].to_string());
        }
        if link.starts_with("spotify:") {
            return Err(ResolutionError::LinkParse(format!(
                "{} is not a track URI",
                link
            )));
        }

        let with_scheme = if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("https://{}", link)
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| ResolutionError::LinkParse(format!("{}: {}", link, e)))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        match segments.as_slice() {
            [] => Err(ResolutionError::LinkParse(format!(
                "{} has no path segment",
                link
            ))),
            [.., "track", id] if id.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Ok(id.to_string())
            }
            _ => Err(ResolutionError::LinkParse(format!(
                "{} is not a track link",
                link
            ))),
        }
    }

    /// Return a valid access token, requesting a new one when the cache is empty or stale.
    async fn access_token(&self) -> SpotifyResult<String> {
        let mut token_lock = self.token.lock().await;

        if let Some(token) = &*token_lock {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting a new Spotify access token");
        let auth = BASE64_STANDARD.encode(format!(
            "{}:{}",
            self.credentials.client_id, self.credentials.client_secret
        ));

        let response = self
            .client
            .post(format!("{}/api/token", self.accounts_url))
            .header(header::AUTHORIZATION, format!("Basic {}", auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                ResolutionError::Backend(format!("Failed to request Spotify token: {}", e))
            })?;

        let response = Self::check_status(response).await?;
        let token: SpotifyToken = response.json().await.map_err(|e| {
            ResolutionError::Backend(format!("Failed to parse Spotify token: {}", e))
        })?;

        let access_token = token.access_token.clone();
        *token_lock = Some(token);

        Ok(access_token)
    }

    async fn check_status(response: reqwest::Response) -> SpotifyResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Cannot read response".to_string());
        Err(ResolutionError::Backend(format!(
            "Spotify API error: {} - {}",
            status, text
        )))
    }

    async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> SpotifyResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let token = self.access_token().await?;

        let response = self
            .client
            .get(format!("{}{}", self.api_url, path))
            .query(query)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| ResolutionError::Backend(format!("Spotify request failed: {}", e)))?;

        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ResolutionError::Backend(format!("Failed to parse Spotify data: {}", e)))
    }
}

#[async_trait]
impl TrackMetadataProvider for SpotifyApi {
    async fn track(&self, track_id: &str) -> SpotifyResult<SpotifyTrack> {
        let track: TrackObject = self.get(&format!("/v1/tracks/{}", track_id), &[]).await?;
        Ok(track.into())
    }

    async fn search_track(&self, query: &str) -> SpotifyResult<Option<TrackSummary>> {
        info!("Searching Spotify for `{}`", query);
        let response: SearchResponse = self
            .get("/v1/search", &[("q", query), ("type", "track"), ("limit", "1")])
            .await?;

        Ok(response
            .tracks
            .and_then(|page| page.items.into_iter().flatten().next())
            .map(TrackSummary::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test_case("https://open.spotify.com/track/abc123?si=xyz", "abc123" ; "query parameters stripped")]
    #[test_case("https://open.spotify.com/track/abc123", "abc123" ; "plain link")]
    #[test_case("open.spotify.com/track/abc123", "abc123" ; "no scheme")]
    #[test_case("https://open.spotify.com/intl-de/track/4uLU6hMCjMI75M1A2tKUQC", "4uLU6hMCjMI75M1A2tKUQC" ; "locale segment")]
    #[test_case("https://open.spotify.com/track/abc123/#frag", "abc123" ; "trailing slash and fragment")]
    #[test_case("spotify:track:abc123", "abc123" ; "uri")]
    fn test_extract_track_id(link: &str, expected: &str) {
        assert_eq!(SpotifyApi::extract_track_id(link), Ok(expected.to_string()));
    }

    #[test_case("https://open.spotify.com" ; "no path")]
    #[test_case("https://open.spotify.com/" ; "root path")]
    #[test_case("https://open.spotify.com/?si=xyz" ; "only query")]
    #[test_case("https://open.spotify.com/album/abc123" ; "album link")]
    #[test_case("https://open.spotify.com/track/" ; "missing id")]
    #[test_case("spotify:album:abc123" ; "album uri")]
    #[test_case("lofi https://open.spotify.com/track/abc 123" ; "embedded in text")]
    fn test_extract_track_id_rejects(link: &str) {
        assert_matches!(
            SpotifyApi::extract_track_id(link),
            Err(ResolutionError::LinkParse(_))
        );
    }

    #[test]
    fn test_is_spotify_link() {
        assert!(SpotifyApi::is_spotify_link("https://open.spotify.com/track/abc"));
        assert!(SpotifyApi::is_spotify_link("spotify:track:abc"));
        assert!(!SpotifyApi::is_spotify_link("lofi beats"));
        assert!(!SpotifyApi::is_spotify_link("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn test_search_query_uses_primary_artist() {
        let track = SpotifyTrack {
            name: "Around the World".to_string(),
            artists: vec!["Daft Punk".to_string(), "Someone Else".to_string()],
        };
        assert_eq!(track.search_query(), "Around the World Daft Punk");

        let lonely = SpotifyTrack {
            name: "Untitled".to_string(),
            artists: vec![],
        };
        assert_eq!(lonely.search_query(), "Untitled");
    }

    fn credentials() -> SpotifyCredentials {
        SpotifyCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        }
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        // base64("id:secret")
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header("Authorization", "Basic aWQ6c2VjcmV0"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-123",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn api_for(server: &MockServer) -> SpotifyApi {
        SpotifyApi::new(reqwest::Client::new(), credentials())
            .with_base_urls(server.uri(), server.uri())
    }

    #[tokio::test]
    async fn test_track_lookup_caches_token() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/tracks/abc123"))
            .and(header("Authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "abc123",
                "name": "Midnight City",
                "artists": [{"name": "M83"}, {"name": "Other"}],
                "external_urls": {"spotify": "https://open.spotify.com/track/abc123"}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let api = api_for(&server);
        let first = api.track("abc123").await.unwrap();
        let second = api.track("abc123").await.unwrap();

        assert_eq!(
            first,
            SpotifyTrack {
                name: "Midnight City".to_string(),
                artists: vec!["M83".to_string(), "Other".to_string()],
            }
        );
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_track_lookup_not_found() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/tracks/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let result = api_for(&server).track("missing").await;
        assert_matches!(result, Err(ResolutionError::Backend(msg)) if msg.contains("404"));
    }

    #[tokio::test]
    async fn test_token_failure_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let result = api_for(&server).track("abc123").await;
        assert_matches!(result, Err(ResolutionError::Backend(_)));
    }

    #[tokio::test]
    async fn test_search_track_top_result() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("q", "midnight city"))
            .and(query_param("type", "track"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tracks": {
                    "items": [{
                        "id": "abc123",
                        "name": "Midnight City",
                        "artists": [{"name": "M83"}],
                        "external_urls": {"spotify": "https://open.spotify.com/track/abc123"}
                    }]
                }
            })))
            .mount(&server)
            .await;

        let summary = api_for(&server).search_track("midnight city").await.unwrap();

        assert_eq!(
            summary,
            Some(TrackSummary {
                title: "Midnight City".to_string(),
                artist: "M83".to_string(),
                url: "https://open.spotify.com/track/abc123".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_search_track_empty() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"tracks": {"items": []}})),
            )
            .mount(&server)
            .await;

        let summary = api_for(&server).search_track("zzzz").await.unwrap();
        assert_eq!(summary, None);
    }
}
