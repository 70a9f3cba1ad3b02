//! Command dispatch: maps a command name to its handler and turns every
//! resolver/session outcome into a chat reply.

use serenity::all::{ChannelId, GuildId, UserId};
use serenity::async_trait;
use humantime_serde::re::humantime;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::commands::messages;
use crate::commands::music::audio_sources::{MetadataResolver, ResolutionError};
use crate::commands::music::utils::music_manager::VoiceSessionManager;
use crate::commands::music::utils::voice_gateway::FinishCallback;
use crate::{CommandResult, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Ping,
    Play,
    Spotify,
    Stop,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Play => "play",
            Command::Spotify => "spotify",
            Command::Stop => "stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a handler needs to know about who asked for what. Built per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub guild_id: Option<GuildId>,
    pub user_id: UserId,
    /// Voice channel the invoking user sits in, if any.
    pub voice_channel: Option<ChannelId>,
    /// Raw argument text after the command name.
    pub args: String,
}

/// Where a handler's replies go (the originating channel, in production).
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), Error>;
}

pub struct CommandRouter {
    sessions: Arc<VoiceSessionManager>,
    resolver: Arc<MetadataResolver>,
    prefix: String,
}

impl CommandRouter {
    pub fn new(
        sessions: Arc<VoiceSessionManager>,
        resolver: Arc<MetadataResolver>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            resolver,
            prefix: prefix.into(),
        }
    }

    /// Run `command`. Handler failures become replies; only reply delivery errors propagate.
    pub async fn dispatch(
        &self,
        command: Command,
        invocation: &CommandInvocation,
        reply: &dyn ReplySink,
    ) -> CommandResult {
        info!(
            "Dispatching {} for user {} in guild {:?}",
            command, invocation.user_id, invocation.guild_id
        );

        match command {
            Command::Ping => reply.send_text(messages::pong()).await,
            Command::Play => self.play(invocation, reply).await,
            Command::Spotify => self.spotify(invocation, reply).await,
            Command::Stop => self.stop(invocation, reply).await,
        }
    }

    async fn play(&self, invocation: &CommandInvocation, reply: &dyn ReplySink) -> CommandResult {
        let Some(guild_id) = invocation.guild_id else {
            return reply.send_text(messages::guild_only()).await;
        };
        let query = invocation.args.trim();
        if query.is_empty() {
            let usage = messages::usage(
                &self.prefix,
                Command::Play.name(),
                "<song name or Spotify link>",
            );
            return reply.send_text(usage).await;
        }
        let Some(channel_id) = invocation.voice_channel else {
            return reply.send_text(messages::not_in_voice_channel()).await;
        };

        let query = match self.resolver.canonical_query(query).await {
            Ok(query) => query,
            Err(err) => {
                warn!("Could not resolve Spotify link `{}`: {}", query, err);
                return reply.send_text(messages::spotify_parse_failed()).await;
            }
        };

        let session = match self.sessions.ensure_connected(guild_id, channel_id).await {
            Ok(session) => session,
            Err(err) => {
                error!(
                    "Could not connect to channel {} in guild {}: {}",
                    channel_id, guild_id, err
                );
                return reply.send_text(messages::join_failed()).await;
            }
        };

        reply.send_text(messages::searching(&query)).await?;

        let request = match self.resolver.find_audio(&query).await {
            Ok(request) => request,
            Err(err) => {
                error!("yt-dlp error for `{}`: {}", query, err);
                return reply.send_text(messages::youtube_failed()).await;
            }
        };

        reply.send_text(messages::now_playing(&request.title)).await?;
        info!(
            "Playing `{}` ({}, {}) in guild {}",
            request.title,
            request.webpage_url.as_deref().unwrap_or("no page"),
            request
                .duration
                .map(|duration| humantime::format_duration(duration).to_string())
                .unwrap_or_else(|| "live".to_string()),
            guild_id
        );
        debug!("Streaming from: {}", request.source_locator);

        let title = request.title.clone();
        let on_finish: FinishCallback = Box::new(move |error| match error {
            Some(err) => error!("Playback of `{}` failed: {}", title, err),
            None => info!("Playback of `{}` finished", title),
        });

        // Announced already; failures from here on are logged only.
        if let Err(err) = self.sessions.play(&session, &request, on_finish).await {
            error!("Failed to start playback in guild {}: {}", guild_id, err);
        }

        Ok(())
    }

    async fn spotify(&self, invocation: &CommandInvocation, reply: &dyn ReplySink) -> CommandResult {
        let query = invocation.args.trim();
        if query.is_empty() {
            let usage = messages::usage(&self.prefix, Command::Spotify.name(), "<search text>");
            return reply.send_text(usage).await;
        }

        let text = match self.resolver.search_track(query).await {
            Ok(track) => messages::track_summary(&track),
            Err(ResolutionError::NoResults(_)) => messages::no_tracks_found(),
            Err(err) => {
                error!("Error during Spotify search: {}", err);
                messages::spotify_search_failed()
            }
        };

        reply.send_text(text).await
    }

    async fn stop(&self, invocation: &CommandInvocation, reply: &dyn ReplySink) -> CommandResult {
        let Some(guild_id) = invocation.guild_id else {
            return reply.send_text(messages::guild_only()).await;
        };

        // Teardown problems are logged by the manager; the only failure left is having no session.
        let text = match self.sessions.stop_and_disconnect(guild_id).await {
            Ok(()) => messages::stopped(),
            Err(err) => {
                debug!("Nothing to stop in guild {}: {}", guild_id, err);
                messages::not_connected()
            }
        };

        reply.send_text(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(Command::Ping, "ping")]
    #[test_case(Command::Play, "play")]
    #[test_case(Command::Spotify, "spotify")]
    #[test_case(Command::Stop, "stop")]
    fn test_command_names(command: Command, expected: &str) {
        assert_eq!(command.name(), expected);
        assert_eq!(command.to_string(), expected);
    }
}
