// CLI adapter - drives the native `yt-dlp` binary
//
// Metadata-only queries use `--dump-json`; downloads stream stdout line by
// line and turn `--progress-template` lines into ProgressEvents.

use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc::UnboundedSender;

use super::traits::{
    ExtendedFormat, ExtendedVideoInfo, ExtractorConfig, InfoExtractor, MediaEngine,
};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::{DownloadOptions, NetworkConfig};
use crate::downloader::progress::{ProgressEvent, PROGRESS_TEMPLATE};
use crate::downloader::utils::{get_proxy_args, get_timeout_args, run_output_with_timeout};

/// Lines of stderr kept for error classification
const STDERR_TAIL: usize = 200;

/// yt-dlp binary used for both metadata queries and downloads
pub struct YtDlpCli {
    ytdlp_path: String,
    network: NetworkConfig,
}

impl YtDlpCli {
    pub fn new(ytdlp_path: impl Into<String>, network: NetworkConfig) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            network,
        }
    }

    /// Build metadata query arguments
    fn build_info_args(&self, url: &str, config: &ExtractorConfig) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            config.timeout_seconds.to_string(),
        ];

        if let Some(format) = &config.format {
            args.push("-f".to_string());
            args.push(format.clone());
        }

        if let Some(path) = &config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        if let Some(proxy) = &config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args.push(url.to_string());
        args
    }

    /// Build download arguments
    fn build_download_args(&self, url: &str, options: &DownloadOptions) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            options.format.clone(),
            "-o".to_string(),
            options.output_template.clone(),
            "--merge-output-format".to_string(),
            options.merge_format.clone(),
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
        ];

        if let Some(path) = &options.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        args.extend(get_proxy_args(&self.network));
        args.extend(get_timeout_args(&self.network));

        args.push(url.to_string());
        args
    }

    /// Parse `--dump-json` output
    fn parse_json(stdout: &[u8]) -> Result<ExtendedVideoInfo, DownloadError> {
        let json_str = String::from_utf8_lossy(stdout);
        let json: serde_json::Value = serde_json::from_str(&json_str)
            .map_err(|e| DownloadError::ParseError(format!("Invalid JSON: {}", e)))?;

        let formats = Self::parse_formats(&json)?;
        let text = |key: &str| json[key].as_str().map(|s| s.to_string());

        Ok(ExtendedVideoInfo {
            title: text("title").unwrap_or_else(|| "video".to_string()),
            format_note: text("format_note"),
            resolution: text("resolution"),
            formats,
        })
    }

    fn parse_formats(json: &serde_json::Value) -> Result<Vec<ExtendedFormat>, DownloadError> {
        let formats_array = json["formats"]
            .as_array()
            .ok_or_else(|| DownloadError::ParseError("No formats array in JSON".to_string()))?;

        let formats = formats_array
            .iter()
            .map(|f| ExtendedFormat {
                format_id: f["format_id"].as_str().unwrap_or("").to_string(),
                ext: f["ext"].as_str().unwrap_or("").to_string(),
                resolution: f["resolution"].as_str().map(|s| s.to_string()),
                filesize: f["filesize"].as_u64(),
                filesize_approx: f["filesize_approx"].as_u64(),
                format_note: f["format_note"].as_str().map(|s| s.to_string()),
            })
            .collect();

        Ok(formats)
    }
}

#[async_trait]
impl InfoExtractor for YtDlpCli {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn extract(
        &self,
        url: &str,
        config: &ExtractorConfig,
    ) -> Result<ExtendedVideoInfo, DownloadError> {
        let args = self.build_info_args(url, config);
        log::debug!("[YtDlp] {} {}", self.ytdlp_path, args.join(" "));

        let limit = config.timeout_seconds as u64 * 2;
        let out = run_output_with_timeout(&self.ytdlp_path, args, limit).await?;

        if out.status.success() {
            Self::parse_json(&out.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            log::warn!("[YtDlp] Metadata query failed: {}", stderr);
            Err(DownloadError::from(stderr))
        }
    }
}

#[async_trait]
impl MediaEngine for YtDlpCli {
    fn name(&self) -> &'static str {
        "cli-yt-dlp"
    }

    async fn download(
        &self,
        url: &str,
        options: &DownloadOptions,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<(), DownloadError> {
        let args = self.build_download_args(url, options);
        log::info!("[YtDlp] Starting download: {} {}", self.ytdlp_path, args.join(" "));

        let mut child = TokioCommand::new(&self.ytdlp_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::ToolNotFound(format!("Failed to start yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::UpstreamFailure("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::UpstreamFailure("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            let text = String::from_utf8_lossy(&buf).into_owned();
            let mut tail: VecDeque<&str> = VecDeque::new();
            for line in text.lines() {
                tail.push_back(line);
                if tail.len() > STDERR_TAIL {
                    tail.pop_front();
                }
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    if let Err(kill_err) = child.kill().await {
                        log::warn!("[YtDlp] Failed to kill yt-dlp: {}", kill_err);
                    }
                    let stderr_output = stderr_task.await.unwrap_or_default();
                    log::warn!("[YtDlp] Lost stdout ({}): {}", e, stderr_output);
                    return Err(DownloadError::UpstreamFailure(format!(
                        "Failed to read stdout: {}",
                        e
                    )));
                }
            };

            match ProgressEvent::parse_line(&line) {
                // receiver gone means nobody is polling; keep downloading
                Some(event) => {
                    let _ = progress.send(event);
                }
                None => log::debug!("[yt-dlp] {}", line),
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::UpstreamFailure(format!("Process error: {}", e)))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if status.success() {
            log::info!("[YtDlp] Download finished for {}", url);
            Ok(())
        } else {
            log::warn!("[YtDlp] Download failed ({}): {}", status, stderr_output);
            Err(DownloadError::from(stderr_output))
        }
    }
}
