// Metadata fetcher backed by the YouTube Data API v3

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::errors::DownloadError;
use super::models::{NetworkConfig, VideoDetails, VideoIdentifier};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Source of title/channel/view-count metadata
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// `source_url` is echoed back into the details record.
    async fn fetch_details(
        &self,
        id: &VideoIdentifier,
        source_url: &str,
    ) -> Result<VideoDetails, DownloadError>;
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    // the API serialises counts as decimal strings
    view_count: Option<String>,
}

/// Client for `GET /videos?part=snippet,statistics`
pub struct YouTubeDataApi {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl YouTubeDataApi {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        network: &NetworkConfig,
    ) -> Result<Self, DownloadError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = network.timeout {
            builder = builder.timeout(Duration::from_secs(secs as u64));
        }
        if let Some(proxy_url) = network.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                DownloadError::UpstreamFailure(format!("Invalid proxy URL {}: {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn into_details(
        response: VideoListResponse,
        id: &VideoIdentifier,
        source_url: &str,
    ) -> Result<VideoDetails, DownloadError> {
        let item = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| DownloadError::NotFound(id.to_string()))?;

        let views = item
            .statistics
            .view_count
            .and_then(|count| count.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(VideoDetails {
            title: item.snippet.title,
            channel: item.snippet.channel_title,
            views,
            thumbnail_url: item
                .snippet
                .thumbnails
                .default
                .map(|t| t.url)
                .unwrap_or_default(),
            source_url: source_url.to_string(),
        })
    }
}

#[async_trait]
impl MetadataProvider for YouTubeDataApi {
    async fn fetch_details(
        &self,
        id: &VideoIdentifier,
        source_url: &str,
    ) -> Result<VideoDetails, DownloadError> {
        let endpoint = format!("{}/videos", self.api_base);
        log::debug!("[Metadata] Fetching details for {}", id);

        let response = self
            .client
            .get(&endpoint)
            .query(&[
                ("part", "snippet,statistics"),
                ("id", id.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: VideoListResponse = response.json().await?;
        Self::into_details(body, id, source_url)
    }
}
