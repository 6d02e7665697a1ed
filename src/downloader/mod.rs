// Downloader module - link validation, metadata, format catalog, downloads

pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod link;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod tools;
pub mod utils;

pub use errors::DownloadError;
pub use models::{DownloadResult, FormatEntry, NetworkConfig, VideoDetails, VideoIdentifier};
pub use orchestrator::{Downloader, DownloaderSettings, LookupResult};
pub use progress::{ProgressRegistry, ProgressState, SessionId, SessionStatus};
