use chrono::{DateTime, Local};
use reqwest::Client;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CatalogError, Result};
use crate::services::m3u_parser::{decode_playlist, M3U_HEADER};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Working directory downloaded playlists are saved into
    pub download_dir: PathBuf,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            download_dir: std::env::temp_dir().join("tv_ip_playlists"),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: "VLC/3.0.20 LibVLC/3.0.20".to_string(),
        }
    }
}

/// Result of a download: success flag, message for the user, saved path
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl DownloadResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            path: None,
        }
    }
}

/// Local file name for a playlist URL.
///
/// Last path segment when it looks like a file name (`.m3u` appended when
/// the extension is something else), `playlist_<timestamp>.m3u` otherwise.
pub fn derive_file_name(url: &str, now: DateTime<Local>) -> String {
    let segment = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    if segment.is_empty() || !segment.contains('.') {
        return format!("playlist_{}.m3u", now.format("%Y%m%d_%H%M%S"));
    }

    let lower = segment.to_lowercase();
    if lower.ends_with(".m3u") || lower.ends_with(".m3u8") {
        segment
    } else {
        format!("{}.m3u", segment)
    }
}

/// Fetches remote playlists into the working directory
pub struct Downloader {
    client: Client,
    options: DownloadOptions,
}

impl Downloader {
    pub fn new(options: DownloadOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&options.user_agent)
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .danger_accept_invalid_certs(true)
            .gzip(true)
            .build()?;

        Ok(Self { client, options })
    }

    /// Download `url`; never fails, the outcome is in the result
    pub async fn download(&self, url: &str) -> DownloadResult {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return DownloadResult::failed("Invalid URL, it must start with http:// or https://");
        }

        match self.try_download(url).await {
            Ok((path, file_name)) => {
                tracing::info!("Playlist downloaded from {} to {}", url, path.display());
                DownloadResult {
                    success: true,
                    message: format!("Playlist downloaded: {}", file_name),
                    path: Some(path),
                }
            }
            Err(e) => {
                tracing::warn!("Playlist download from {} failed: {}", url, e);
                DownloadResult::failed(e.to_string())
            }
        }
    }

    async fn try_download(&self, url: &str) -> Result<(PathBuf, String)> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Network(format!("HTTP {}", status.as_u16())));
        }

        let bytes = response.bytes().await?;
        let content = decode_playlist(&bytes)?;

        if !content.trim_start().starts_with(M3U_HEADER) {
            let preview: String = content.chars().take(100).collect();
            tracing::debug!("Rejected download, content starts with: {}", preview);
            return Err(CatalogError::Format(
                "downloaded file is not an M3U playlist".to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.options.download_dir).await?;
        let file_name = derive_file_name(url, Local::now());
        let path = self.options.download_dir.join(&file_name);
        tokio::fs::write(&path, content.as_bytes()).await?;

        Ok((path, file_name))
    }
}
