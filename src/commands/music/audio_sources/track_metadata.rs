//! Resolved track types and the decoding of `yt-dlp -j` output into them.

use std::time::Duration;

use super::ResolutionError;

/// A resolved, playable track. Transient: produced per `play`, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    /// Display title of the top hit.
    pub title: String,
    /// Direct audio stream URL handed to the voice layer.
    pub source_locator: String,
    /// Human-facing page of the hit (e.g. the YouTube watch URL).
    pub webpage_url: Option<String>,
    /// Length of the hit; `None` for live streams.
    pub duration: Option<Duration>,
}

impl PlaybackRequest {
    /// Decode the JSON that `yt-dlp -j` prints for the selected entry.
    ///
    /// For searches `yt-dlp` prints one JSON document per line; only the first one is used.
    pub fn from_ytdlp_json(stdout: &[u8], query: &str) -> Result<Self, ResolutionError> {
        let text = String::from_utf8_lossy(stdout);
        let Some(line) = text.lines().map(str::trim).find(|line| !line.is_empty()) else {
            return Err(ResolutionError::NoResults(query.to_string()));
        };

        let json: serde_json::Value = serde_json::from_str(line).map_err(|e| {
            ResolutionError::Backend(format!("Failed to parse video metadata: {}", e))
        })?;

        // Playlist-shaped output when a search is printed as a single document.
        let entry = match json["entries"].as_array() {
            Some(entries) => entries
                .first()
                .ok_or_else(|| ResolutionError::NoResults(query.to_string()))?,
            None => &json,
        };

        let source_locator = entry["url"]
            .as_str()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ResolutionError::Backend("Missing stream url".to_string()))?
            .to_string();

        Ok(Self {
            title: entry["title"]
                .as_str()
                .unwrap_or("Unknown Track")
                .to_string(),
            source_locator,
            webpage_url: entry["webpage_url"].as_str().map(str::to_string),
            duration: entry["duration"]
                .as_f64()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
        })
    }
}

/// Short description of a catalogue track, as shown by the search command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub title: String,
    pub artist: String,
    pub url: String,
}
