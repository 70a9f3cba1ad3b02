//! Process configuration, read from the environment (and `.env` via `dotenv`).

use std::env;
use std::fmt;
use std::time::Duration;

use humantime_serde::re::humantime;
use thiserror::Error;

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";

/// Errors raised while loading the bot configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Client-credentials pair for the Spotify Web API.
#[derive(Clone, PartialEq, Eq)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub discord_token: String,
    pub spotify: SpotifyCredentials,
    pub command_prefix: String,
    pub connect_timeout: Duration,
    pub ytdlp_path: String,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("discord_token", &"<redacted>")
            .field("spotify", &self.spotify)
            .field("command_prefix", &self.command_prefix)
            .field("connect_timeout", &self.connect_timeout)
            .field("ytdlp_path", &self.ytdlp_path)
            .finish()
    }
}

impl BotConfig {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load the configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let connect_timeout = match get("JUKEBOX_CONNECT_TIMEOUT") {
            Some(raw) => {
                let timeout =
                    humantime::parse_duration(&raw).map_err(|e| ConfigError::Invalid {
                        name: "JUKEBOX_CONNECT_TIMEOUT",
                        reason: e.to_string(),
                    })?;
                if timeout.is_zero() {
                    return Err(ConfigError::Invalid {
                        name: "JUKEBOX_CONNECT_TIMEOUT",
                        reason: "must be greater than zero".to_string(),
                    });
                }
                timeout
            }
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        Ok(Self {
            discord_token: require("DISCORD_TOKEN")?,
            spotify: SpotifyCredentials {
                client_id: require("SPOTIFY_CLIENT_ID")?,
                client_secret: require("SPOTIFY_CLIENT_SECRET")?,
            },
            command_prefix: get("JUKEBOX_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            connect_timeout,
            ytdlp_path: get("YTDLP_PATH").unwrap_or_else(|| DEFAULT_YTDLP_PATH.to_string()),
        })
    }
}
