// Orchestrator - lookup, format catalog and download sessions

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedSender};

use super::errors::DownloadError;
use super::extractors::{ExtractorConfig, InfoExtractor, MediaEngine};
use super::format_selector::{FormatSelector, TARGET_CONTAINER};
use super::link;
use super::metadata::MetadataProvider;
use super::models::{DownloadOptions, DownloadResult, FormatEntry, VideoDetails};
use super::progress::{ProgressEvent, ProgressRegistry, SessionId};
use super::utils::{escape_template, sanitize_filename, touch};

const EXT_PLACEHOLDER: &str = "%(ext)s";

/// Where downloads land and how yt-dlp is invoked
#[derive(Debug, Clone)]
pub struct DownloaderSettings {
    pub media_root: PathBuf,
    pub cookies_path: Option<PathBuf>,
    pub extractor: ExtractorConfig,
}

/// Details and curated formats for one link; either half may be missing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub details: Option<VideoDetails>,
    pub formats: Option<Vec<FormatEntry>>,
    pub notices: Vec<String>,
}

#[derive(Clone)]
pub struct Downloader {
    metadata: Arc<dyn MetadataProvider>,
    extractor: Arc<dyn InfoExtractor>,
    engine: Arc<dyn MediaEngine>,
    settings: Arc<DownloaderSettings>,
    progress: ProgressRegistry,
}

impl Downloader {
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        extractor: Arc<dyn InfoExtractor>,
        engine: Arc<dyn MediaEngine>,
        settings: DownloaderSettings,
    ) -> Self {
        Self {
            metadata,
            extractor,
            engine,
            settings: Arc::new(settings),
            progress: ProgressRegistry::new(),
        }
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    pub async fn video_details(&self, url: &str) -> Result<VideoDetails, DownloadError> {
        let id = link::extract_id(url)?;
        self.metadata.fetch_details(&id, url).await
    }

    pub async fn list_formats(&self, url: &str) -> Result<Vec<FormatEntry>, DownloadError> {
        let formats = self
            .extractor
            .extract_formats(url, &self.settings.extractor)
            .await?;
        Ok(FormatSelector::build_entries(&formats))
    }

    /// Details and formats for the form page. Each half fails independently.
    pub async fn lookup(&self, url: &str) -> Result<LookupResult, DownloadError> {
        if !link::validate(url) {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        let (details, formats) = tokio::join!(self.video_details(url), self.list_formats(url));
        let mut notices = Vec::new();

        let details = details
            .map_err(|e| {
                log::warn!("[Downloader] Details lookup failed for {}: {}", url, e);
                notices.push(e.user_message());
            })
            .ok();
        let formats = formats
            .map_err(|e| {
                log::warn!("[Downloader] Format listing failed for {}: {}", url, e);
                notices.push(format!("Unable to list formats: {}", e.user_message()));
            })
            .ok();

        Ok(LookupResult {
            details,
            formats,
            notices,
        })
    }

    /// Run one download to completion, reporting progress into `events`.
    pub async fn download(
        &self,
        url: &str,
        selector: &str,
        events: UnboundedSender<ProgressEvent>,
    ) -> Result<DownloadResult, DownloadError> {
        if !link::validate(url) {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        let query = self
            .settings
            .extractor
            .clone()
            .with_format(Some(selector.to_string()));
        let info = self.extractor.extract(url, &query).await.map_err(|e| {
            log::warn!(
                "[Downloader] {} could not resolve {}: {}",
                self.extractor.name(),
                selector,
                e
            );
            e
        })?;

        let title = sanitize_filename(&info.title);
        let quality = sanitize_filename(&FormatSelector::quality_label(
            info.format_note.as_deref(),
            info.resolution.as_deref(),
        ));

        let output_template = output_template(&self.settings.media_root, &title, &quality);
        let options = DownloadOptions {
            format: format!("{}+bestaudio/best", selector),
            output_template: output_template.clone(),
            cookies_path: self.cookies_path(),
            merge_format: TARGET_CONTAINER.to_string(),
        };

        log::info!(
            "[Downloader] Handing {} to {} as {}",
            url,
            self.engine.name(),
            options.output_template
        );
        self.engine.download(url, &options, events).await?;

        let path = PathBuf::from(expected_path(&output_template, TARGET_CONTAINER));
        if !path.exists() {
            log::error!("[Downloader] File not found after download: {}", path.display());
            return Err(DownloadError::FileMissing(path.display().to_string()));
        }

        if let Err(e) = touch(&path) {
            log::warn!("[Downloader] Could not update mtime of {}: {}", path.display(), e);
        }

        log::info!("[Downloader] Video downloaded successfully: {}", path.display());
        Ok(DownloadResult {
            path,
            title,
            quality,
            completed_at: OffsetDateTime::now_utc(),
        })
    }

    /// Validate, open a progress session and run the download in the background.
    pub fn start_download(&self, url: &str, selector: &str) -> Result<SessionId, DownloadError> {
        if !link::validate(url) {
            return Err(DownloadError::InvalidUrl(url.to_string()));
        }

        let id = self.progress.start();
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = self.progress.attach(id.clone(), rx);

        let downloader = self.clone();
        let session = id.clone();
        let url = url.to_string();
        let selector = selector.to_string();
        tokio::spawn(async move {
            log::info!("[Downloader] {} started: {} ({})", session, url, selector);
            let outcome = downloader.download(&url, &selector, tx).await;
            // tx was moved into download and dropped, so the tracker drains and exits
            if let Err(e) = tracker.await {
                log::warn!("[Downloader] {} progress tracker ended abnormally: {}", session, e);
            }

            match outcome {
                Ok(result) => downloader.progress.complete(&session, result),
                Err(e) => {
                    log::error!("[Downloader] {} failed: {}", session, e);
                    downloader.progress.fail(&session, e.user_message());
                }
            }
        });

        Ok(id)
    }

    fn cookies_path(&self) -> Option<PathBuf> {
        let path = self.settings.cookies_path.as_ref()?;
        if path.exists() {
            Some(path.clone())
        } else {
            log::warn!(
                "[Downloader] Cookie file {} not found, continuing without it",
                path.display()
            );
            None
        }
    }
}

/// `<media_root>/<title>_<quality>.%(ext)s`, escaped for yt-dlp
fn output_template(media_root: &Path, title: &str, quality: &str) -> String {
    let stem = media_root.join(format!("{}_{}", title, quality));
    format!("{}.{}", escape_template(&stem.to_string_lossy()), EXT_PLACEHOLDER)
}

/// File path yt-dlp produces for `template` once the extension is resolved.
/// Only the trailing placeholder is substituted; everything before it is literal.
fn expected_path(template: &str, ext: &str) -> String {
    match template.strip_suffix(EXT_PLACEHOLDER) {
        Some(stem) => format!("{}{}", stem.replace("%%", "%"), ext),
        None => template.replace("%%", "%"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::extractors::{ExtendedFormat, ExtendedVideoInfo};
    use crate::downloader::models::VideoIdentifier;
    use crate::downloader::progress::{ProgressState, SessionOutcome};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct FakeMetadata;

    #[async_trait]
    impl MetadataProvider for FakeMetadata {
        async fn fetch_details(
            &self,
            id: &VideoIdentifier,
            source_url: &str,
        ) -> Result<VideoDetails, DownloadError> {
            if id.as_str() == "missing" {
                return Err(DownloadError::NotFound(id.to_string()));
            }
            Ok(VideoDetails {
                title: "a/b:c*d".to_string(),
                channel: "chan".to_string(),
                views: 42,
                thumbnail_url: String::new(),
                source_url: source_url.to_string(),
            })
        }
    }

    struct FakeExtractor {
        queried_formats: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl InfoExtractor for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn extract(
            &self,
            _url: &str,
            config: &ExtractorConfig,
        ) -> Result<ExtendedVideoInfo, DownloadError> {
            self.queried_formats.lock().push(config.format.clone());
            Ok(ExtendedVideoInfo {
                title: "a/b:c*d".to_string(),
                format_note: Some("360p".to_string()),
                resolution: Some("640x360".to_string()),
                formats: vec![
                    ExtendedFormat {
                        format_id: "18".to_string(),
                        ext: "mp4".to_string(),
                        format_note: Some("360p".to_string()),
                        filesize: Some(104_857_600),
                        ..Default::default()
                    },
                    ExtendedFormat {
                        format_id: "243".to_string(),
                        ext: "webm".to_string(),
                        format_note: Some("360p".to_string()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            })
        }
    }

    /// Writes `<template with mp4>` when `create_file` is set
    struct FakeEngine {
        create_file: bool,
        seen: Mutex<Option<DownloadOptions>>,
    }

    #[async_trait]
    impl MediaEngine for FakeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn download(
            &self,
            _url: &str,
            options: &DownloadOptions,
            progress: UnboundedSender<ProgressEvent>,
        ) -> Result<(), DownloadError> {
            *self.seen.lock() = Some(options.clone());
            let _ = progress.send(ProgressEvent::downloading(
                "\x1b[0;94m 45.0%\x1b[0m",
                "1MiB/s",
                "00:03",
            ));
            let _ = progress.send(ProgressEvent::finished());
            if self.create_file {
                std::fs::write(expected_path(&options.output_template, "mp4"), b"video").unwrap();
            }
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        media_root: PathBuf,
        extractor: Arc<FakeExtractor>,
        engine: Arc<FakeEngine>,
        downloader: Downloader,
    }

    fn fixture(create_file: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let media_root = dir.path().to_path_buf();
        let extractor = Arc::new(FakeExtractor {
            queried_formats: Mutex::new(Vec::new()),
        });
        let engine = Arc::new(FakeEngine {
            create_file,
            seen: Mutex::new(None),
        });
        let downloader = Downloader::new(
            Arc::new(FakeMetadata),
            extractor.clone(),
            engine.clone(),
            DownloaderSettings {
                media_root: media_root.clone(),
                cookies_path: Some(dir.path().join("cookies.txt")),
                extractor: ExtractorConfig::default(),
            },
        );
        Fixture {
            _dir: dir,
            media_root,
            extractor,
            engine,
            downloader,
        }
    }

    #[tokio::test]
    async fn test_download_success_reports_sanitized_title_and_quality() {
        let fx = fixture(true);
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = fx
            .downloader
            .download("https://www.youtube.com/watch?v=abc", "18", tx)
            .await
            .unwrap();

        assert_eq!(result.title, "a_b_c_d");
        assert_eq!(result.quality, "360p");
        assert_eq!(result.path, fx.media_root.join("a_b_c_d_360p.mp4"));
        assert!(result.path.exists());

        let options = fx.engine.seen.lock().clone().unwrap();
        assert_eq!(options.format, "18+bestaudio/best");
        assert_eq!(options.merge_format, "mp4");
        // cookie file does not exist in the fixture
        assert!(options.cookies_path.is_none());
        assert_eq!(*fx.extractor.queried_formats.lock(), vec![Some("18".to_string())]);
    }

    #[tokio::test]
    async fn test_download_without_file_is_file_missing() {
        let fx = fixture(false);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = fx
            .downloader
            .download("https://youtu.be/abc", "18", tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::FileMissing(_)));
    }

    #[tokio::test]
    async fn test_download_rejects_foreign_url() {
        let fx = fixture(true);
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = fx
            .downloader
            .download("https://vimeo.com/1", "18", tx)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::InvalidUrl(_)));
        assert!(fx.extractor.queried_formats.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cookie_file_passed_when_present() {
        let fx = fixture(true);
        let cookies = fx.media_root.join("cookies.txt");
        std::fs::write(cookies, b"# Netscape HTTP Cookie File").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        fx.downloader
            .download("https://youtu.be/abc", "18", tx)
            .await
            .unwrap();

        let options = fx.engine.seen.lock().clone().unwrap();
        assert_eq!(options.cookies_path, Some(fx.media_root.join("cookies.txt")));
    }

    #[tokio::test]
    async fn test_started_session_completes() {
        let fx = fixture(true);
        let id = fx
            .downloader
            .start_download("https://youtu.be/abc", "18")
            .unwrap();

        let mut status = fx.downloader.progress().status(&id).unwrap();
        for _ in 0..100 {
            if status.status != SessionOutcome::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = fx.downloader.progress().status(&id).unwrap();
        }

        assert_eq!(status.status, SessionOutcome::Completed);
        assert_eq!(status.progress, ProgressState::finished());
        assert_eq!(status.result.unwrap().quality, "360p");
    }

    #[tokio::test]
    async fn test_started_session_records_failure() {
        let fx = fixture(false);
        let id = fx
            .downloader
            .start_download("https://youtu.be/abc", "18")
            .unwrap();

        let mut status = fx.downloader.progress().status(&id).unwrap();
        for _ in 0..100 {
            if status.status != SessionOutcome::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = fx.downloader.progress().status(&id).unwrap();
        }

        assert_eq!(status.status, SessionOutcome::Failed);
        assert!(status.message.starts_with("File not found"));
    }

    #[test]
    fn test_start_download_rejects_invalid_url_without_session() {
        let fx = fixture(true);
        let err = fx.downloader.start_download("not a url", "18").unwrap_err();
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
        assert_eq!(fx.downloader.progress().latest_snapshot(), ProgressState::idle());
    }

    #[tokio::test]
    async fn test_lookup_collects_partial_failures() {
        let fx = fixture(true);

        let found = fx
            .downloader
            .lookup("https://www.youtube.com/watch?v=abc")
            .await
            .unwrap();
        assert_eq!(found.details.unwrap().views, 42);
        assert_eq!(found.formats.unwrap().len(), 1);
        assert!(found.notices.is_empty());

        let missing = fx
            .downloader
            .lookup("https://www.youtube.com/watch?v=missing")
            .await
            .unwrap();
        assert!(missing.details.is_none());
        assert!(missing.formats.is_some());
        assert_eq!(missing.notices, vec!["Unable to fetch video details."]);
    }

    #[test]
    fn test_template_round_trip_with_percent() {
        let template = output_template(Path::new("/media"), "100% fun", "720p");
        assert_eq!(template, "/media/100%% fun_720p.%(ext)s");
        assert_eq!(expected_path(&template, "mp4"), "/media/100% fun_720p.mp4");
    }

    #[test]
    fn test_literal_placeholder_in_title_is_kept() {
        let template = output_template(Path::new("/media"), "a%(ext)sb", "360p");
        assert_eq!(template, "/media/a%%(ext)sb_360p.%(ext)s");
        assert_eq!(expected_path(&template, "mp4"), "/media/a%(ext)sb_360p.mp4");
    }

    #[test]
    fn test_percent_in_media_root_is_escaped() {
        let template = output_template(Path::new("/srv/100%"), "clip", "720p");
        assert_eq!(template, "/srv/100%%/clip_720p.%(ext)s");
        assert_eq!(expected_path(&template, "mp4"), "/srv/100%/clip_720p.mp4");
    }
}
