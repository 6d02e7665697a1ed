// Common data models for downloader

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Video id extracted from a page link (e.g. "dQw4w9WgXcQ")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoIdentifier(String);

impl VideoIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Video metadata shown next to the format list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    pub title: String,
    pub channel: String,
    pub views: u64,
    pub thumbnail_url: String,
    pub source_url: String,
}

/// One curated download tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatEntry {
    /// yt-dlp format selector (e.g. "18", "137")
    pub format_id: String,
    /// Container extension ("mp4")
    pub container: String,
    /// Human quality label (e.g. "720p")
    pub resolution_label: String,
    /// "12.34 MB" or "Unknown size"
    pub size_label: String,
}

/// Outcome of a completed download
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub path: PathBuf,
    pub title: String,
    pub quality: String,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// Download options handed to the media engine
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Full yt-dlp format expression (already extended with the audio companion)
    pub format: String,
    /// Output template containing the `%(ext)s` placeholder
    pub output_template: String,
    /// cookies.txt for gated content, only set when the file exists
    pub cookies_path: Option<PathBuf>,
    /// Container to merge audio and video into
    pub merge_format: String,
}

/// Proxy and socket timeout shared by yt-dlp and the metadata client
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// HTTP or SOCKS5 proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Timeout in seconds
    pub timeout: Option<u32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Some(30),
        }
    }
}
