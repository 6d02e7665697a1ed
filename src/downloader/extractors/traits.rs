// InfoExtractor / MediaEngine traits and common types

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::DownloadOptions;
use crate::downloader::progress::ProgressEvent;

/// Configuration for metadata-only queries
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Restrict the query to one format selector (`-f`)
    pub format: Option<String>,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<PathBuf>,
    /// Request timeout in seconds
    pub timeout_seconds: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            format: None,
            proxy: None,
            cookies_path: None,
            timeout_seconds: 30,
        }
    }
}

impl ExtractorConfig {
    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// Format information from yt-dlp
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedFormat {
    /// Format ID (e.g., "137", "140")
    pub format_id: String,
    /// File extension (mp4, webm, m4a)
    pub ext: String,
    /// Resolution string (e.g., "1920x1080", "audio only")
    pub resolution: Option<String>,
    /// File size in bytes
    pub filesize: Option<u64>,
    /// Approximate file size (when exact is unknown)
    pub filesize_approx: Option<u64>,
    /// Format note (e.g., "1080p", "tiny")
    pub format_note: Option<String>,
}

impl ExtendedFormat {
    /// Get effective file size (exact or approximate)
    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

/// Video info as reported by a metadata-only query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedVideoInfo {
    pub title: String,
    /// Note of the selected format when the query was restricted with `-f`
    pub format_note: Option<String>,
    /// Resolution of the selected format when the query was restricted with `-f`
    pub resolution: Option<String>,
    pub formats: Vec<ExtendedFormat>,
}

/// Trait for metadata-only extraction (no bytes downloaded)
#[async_trait]
pub trait InfoExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Extract video info with formats
    async fn extract(
        &self,
        url: &str,
        config: &ExtractorConfig,
    ) -> Result<ExtendedVideoInfo, DownloadError>;

    /// Extract only formats
    async fn extract_formats(
        &self,
        url: &str,
        config: &ExtractorConfig,
    ) -> Result<Vec<ExtendedFormat>, DownloadError> {
        let info = self.extract(url, config).await?;
        Ok(info.formats)
    }
}

/// Trait for engines that actually fetch the bytes
#[async_trait]
pub trait MediaEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run a download to completion, pushing progress events into `progress`.
    ///
    /// Returning `Ok` only means the engine exited cleanly; callers still
    /// check that the output file exists.
    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<(), DownloadError>;
}
