//! User-facing reply texts.

use crate::commands::music::audio_sources::TrackSummary;

pub fn pong() -> String {
    "pong!".to_string()
}

pub fn guild_only() -> String {
    "This command only works in a server.".to_string()
}

pub fn usage(prefix: &str, command: &str, argument: &str) -> String {
    format!("Usage: `{}{} {}`", prefix, command, argument)
}

pub fn not_in_voice_channel() -> String {
    "You must be in a voice channel.".to_string()
}

pub fn spotify_parse_failed() -> String {
    "Could not parse Spotify track.".to_string()
}

pub fn join_failed() -> String {
    "Could not join your voice channel.".to_string()
}

pub fn searching(query: &str) -> String {
    format!("Searching for `{}`", query)
}

pub fn youtube_failed() -> String {
    "Failed to get audio from YouTube.".to_string()
}

pub fn now_playing(title: &str) -> String {
    format!("Now playing: **{}**", title)
}

pub fn track_summary(track: &TrackSummary) -> String {
    format!("{} by {}\n{}", track.title, track.artist, track.url)
}

pub fn no_tracks_found() -> String {
    "No tracks found.".to_string()
}

pub fn spotify_search_failed() -> String {
    "There was an error processing your request.".to_string()
}

pub fn stopped() -> String {
    "Playback stopped and disconnected.".to_string()
}

pub fn not_connected() -> String {
    "I'm not connected to a voice channel.".to_string()
}
