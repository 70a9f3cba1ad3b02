//! Streaming search backend on top of the `yt-dlp` command-line tool.

use serenity::async_trait;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use super::{PlaybackRequest, ResolutionError, SearchBackend};

pub struct YoutubeApi {
    ytdlp_path: String,
}

impl YoutubeApi {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
        }
    }

    /// Direct http(s) links go to `yt-dlp` untouched, anything else becomes a one-hit search.
    pub fn search_target(query: &str) -> String {
        let is_direct = Url::parse(query).is_ok_and(|url| matches!(url.scheme(), "http" | "https"));
        if is_direct {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    fn command_args(target: &str) -> [&str; 7] {
        [
            "-j",            // Output as JSON
            "--no-playlist", // Don't process playlists
            "-f",
            "bestaudio/best",
            "--no-warnings",
            "--",
            target,
        ]
    }
}

#[async_trait]
impl SearchBackend for YoutubeApi {
    async fn search(&self, query: &str) -> Result<PlaybackRequest, ResolutionError> {
        let target = Self::search_target(query);
        info!("Resolving audio for `{}`", target);

        let output = Command::new(&self.ytdlp_path)
            .args(Self::command_args(&target))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolutionError::Backend(format!("Failed to run yt-dlp: {}", e)))?;

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolutionError::Backend(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let request = PlaybackRequest::from_ytdlp_json(&output.stdout, query)?;
        debug!("yt-dlp resolved `{}` to `{}`", query, request.title);
        Ok(request)
    }
}
