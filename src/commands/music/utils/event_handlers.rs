use std::sync::Arc;

use serenity::all::GuildId;
use serenity::async_trait;
use songbird::tracks::PlayMode;
use tokio::sync::Mutex;
use tracing::debug;

use super::music_manager::PlaybackError;
use super::voice_gateway::FinishCallback;

/// Track event handler that forwards the end of a playback to its `on_finish` callback.
///
/// Registered for both `TrackEvent::End` and `TrackEvent::Error`; clones share the
/// callback so whichever event arrives first consumes it.
#[derive(Clone)]
pub struct FinishNotifier {
    guild_id: GuildId,
    callback: Arc<Mutex<Option<FinishCallback>>>,
}

impl FinishNotifier {
    pub fn new(guild_id: GuildId, callback: FinishCallback) -> Self {
        Self {
            guild_id,
            callback: Arc::new(Mutex::new(Some(callback))),
        }
    }

    /// Invoke the callback if it has not fired yet.
    pub async fn fire(&self, error: Option<PlaybackError>) {
        let callback = self.callback.lock().await.take();
        match callback {
            Some(callback) => callback(error),
            None => debug!(
                "Finish callback for guild {} already consumed",
                self.guild_id
            ),
        }
    }

    /// Drop the callback without invoking it.
    pub async fn disarm(&self) {
        self.callback.lock().await.take();
    }
}

#[async_trait]
impl songbird::EventHandler for FinishNotifier {
    async fn act(&self, ctx: &songbird::EventContext<'_>) -> Option<songbird::Event> {
        if let songbird::EventContext::Track(tracks) = ctx {
            let error = tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(PlaybackError(format!("{:?}", e))),
                _ => None,
            });
            self.fire(error).await;
        }
        None
    }
}
