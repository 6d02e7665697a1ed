pub mod config;
pub mod downloader;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};

use config::AppConfig;
use downloader::extractors::{ExtractorConfig, YtDlpCli};
use downloader::metadata::YouTubeDataApi;
use downloader::tools::{ToolManager, ToolType};
use downloader::{Downloader, DownloaderSettings, NetworkConfig};
use server::AppState;

/// Wire the collaborators together and serve until Ctrl+C.
pub async fn run(config: AppConfig) -> Result<()> {
    std::fs::create_dir_all(&config.media_root)
        .with_context(|| format!("creating {}", config.media_root.display()))?;

    let tools = Arc::new(ToolManager::with_ytdlp_path(config.ytdlp_path.clone()));
    for tool in [ToolType::YtDlp, ToolType::Ffmpeg] {
        let info = tools.get_tool_info(tool);
        match (&info.path, &info.version) {
            (Some(path), version) => log::info!(
                "[Startup] {} at {} ({})",
                info.name,
                path,
                version.as_deref().unwrap_or("unknown version")
            ),
            (None, _) => log::warn!("[Startup] {} not found; downloads will fail", info.name),
        }
    }

    let network = NetworkConfig {
        proxy: config.proxy.clone(),
        timeout: Some(config.socket_timeout),
    };
    let metadata = YouTubeDataApi::new(config.api_key.clone(), config.api_base.clone(), &network)
        .context("building metadata client")?;
    let ytdlp = Arc::new(YtDlpCli::new(tools.ytdlp_path(), network.clone()));

    let settings = DownloaderSettings {
        media_root: config.media_root.clone(),
        cookies_path: Some(config.cookies_path.clone()),
        extractor: ExtractorConfig::default()
            .with_proxy(network.proxy.clone())
            .with_cookies_path(Some(config.cookies_path.clone()).filter(|p| p.exists()))
            .with_timeout(config.socket_timeout),
    };

    let downloader = Downloader::new(Arc::new(metadata), ytdlp.clone(), ytdlp, settings);
    log::info!("[Startup] Saving downloads to {}", config.media_root.display());

    server::serve(config, AppState { downloader, tools }).await
}
