// Error kinds surfaced by the downloader collaborators

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// Link is malformed, on a foreign host, or carries no video id
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Upstream has no such video
    #[error("Video not found: {0}")]
    NotFound(String),

    /// Transport or HTTP-layer failure from the metadata API or yt-dlp
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Engine reported success but nothing exists at the predicted path
    #[error("Downloaded file missing: {0}")]
    FileMissing(String),

    /// yt-dlp could not be spawned
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Failed to decode yt-dlp JSON output
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl DownloadError {
    /// Notice shown to the user at the HTTP boundary.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidUrl(_) => "Invalid YouTube URL.".to_string(),
            Self::NotFound(_) => "Unable to fetch video details.".to_string(),
            Self::UpstreamFailure(_) => {
                "Unable to fetch video details. Please try again later.".to_string()
            }
            Self::FileMissing(path) => format!("File not found: {}", path),
            Self::ToolNotFound(tool) => format!("Downloader unavailable: {}", tool),
            Self::ParseError(_) => "Unexpected response from the downloader.".to_string(),
        }
    }
}

// Classify yt-dlp stderr into an error kind
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        // a bad selector, not a missing video
        if lower.contains("requested format is not available") {
            return Self::UpstreamFailure(s);
        }

        if lower.contains("video unavailable")
            || lower.contains("private video")
            || lower.contains("not available")
            || lower.contains("has been removed")
        {
            return Self::NotFound(s);
        }

        if lower.contains("unsupported url") || lower.contains("is not a valid url") {
            return Self::InvalidUrl(s);
        }

        Self::UpstreamFailure(s)
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        Self::UpstreamFailure(e.to_string())
    }
}
