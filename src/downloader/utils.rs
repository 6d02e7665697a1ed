// Helper functions shared by the yt-dlp adapter and the orchestrator

use std::path::Path;
use std::process::Stdio;
use std::time::SystemTime;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use crate::downloader::errors::DownloadError;
use crate::downloader::models::NetworkConfig;

/// Characters that are not safe in file names on common filesystems
const UNSAFE_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Run command with timeout and collect its output
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DownloadError::ToolNotFound(format!("Failed to start {}: {}", program, e)))?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        DownloadError::UpstreamFailure(format!("Failed to capture stdout from {}", program))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        DownloadError::UpstreamFailure(format!("Failed to capture stderr from {}", program))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res.map_err(|e| {
                DownloadError::UpstreamFailure(format!("Failed to wait for {}: {}", program, e))
            })?;
            let stdout = join_pipe(stdout_task, "stdout").await?;
            let stderr = join_pipe(stderr_task, "stderr").await?;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::UpstreamFailure(format!(
                "{} timed out after {}s",
                program, timeout_secs
            )))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
    name: &str,
) -> Result<Vec<u8>, DownloadError> {
    task.await
        .map_err(|e| DownloadError::UpstreamFailure(format!("{} task failed: {}", name, e)))?
        .map_err(|e| DownloadError::UpstreamFailure(format!("Failed to read {}: {}", name, e)))
}

/// Replace characters that are unsafe in file names with `_`
pub fn sanitize_filename(title: &str) -> String {
    title
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Escape a literal for use inside a yt-dlp output template
pub fn escape_template(value: &str) -> String {
    value.replace('%', "%%")
}

/// Bump a file's modification time to now
pub fn touch(path: &Path) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}

/// Build proxy arguments for yt-dlp
pub fn get_proxy_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args
}

/// Build timeout arguments for yt-dlp
pub fn get_timeout_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(timeout) = config.timeout {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }

    args
}
