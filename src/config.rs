use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::{
    collections::HashMap,
    fs,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
};

use crate::downloader::metadata::DEFAULT_API_BASE;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_COOKIES_FILE: &str = "cookies.txt";
pub const DEFAULT_SOCKET_TIMEOUT: u32 = 30;

/// Command-line flags; each falls back to an environment variable, then to
/// the `.env` file, then to a built-in default.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YouTube Data API key
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the metadata API
    #[arg(long, env = "YOUTUBE_API_BASE")]
    pub api_base: Option<String>,

    /// Directory downloads are written to
    #[arg(long, env = "MEDIA_ROOT")]
    pub media_root: Option<PathBuf>,

    /// cookies.txt handed to yt-dlp for gated videos
    #[arg(long, env = "COOKIES_FILE")]
    pub cookies_file: Option<PathBuf>,

    /// Explicit yt-dlp binary
    #[arg(long, env = "YTDLP_PATH")]
    pub ytdlp_path: Option<String>,

    /// HTTP or SOCKS5 proxy for both the API and yt-dlp
    #[arg(long, env = "PROXY")]
    pub proxy: Option<String>,

    /// Socket timeout in seconds for metadata requests
    #[arg(long, env = "SOCKET_TIMEOUT")]
    pub socket_timeout: Option<u32>,

    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Path of the optional env file
    #[arg(long, default_value = DEFAULT_ENV_PATH)]
    pub env_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_base: String,
    pub media_root: PathBuf,
    pub cookies_path: PathBuf,
    pub ytdlp_path: Option<String>,
    pub proxy: Option<String>,
    pub socket_timeout: u32,
    pub host: IpAddr,
    pub port: u16,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();
        let file_vars = read_env_file(&cli.env_file)?;
        Self::resolve(cli, &file_vars)
    }

    pub fn resolve(cli: Cli, file_vars: &HashMap<String, String>) -> Result<Self> {
        let file = |key: &str| {
            file_vars
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = non_empty(cli.api_key)
            .or_else(|| file("YOUTUBE_API_KEY"))
            .ok_or_else(|| anyhow!("YOUTUBE_API_KEY not set"))?;
        let api_base = non_empty(cli.api_base)
            .or_else(|| file("YOUTUBE_API_BASE"))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let media_root = cli
            .media_root
            .or_else(|| file("MEDIA_ROOT").map(PathBuf::from))
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("media"));
        let cookies_path = cli
            .cookies_file
            .or_else(|| file("COOKIES_FILE").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIES_FILE));
        let ytdlp_path = non_empty(cli.ytdlp_path).or_else(|| file("YTDLP_PATH"));
        let proxy = non_empty(cli.proxy).or_else(|| file("PROXY"));

        let socket_timeout = match cli.socket_timeout {
            Some(value) => value,
            None => file("SOCKET_TIMEOUT")
                .map(|v| v.parse::<u32>().with_context(|| format!("SOCKET_TIMEOUT={v}")))
                .transpose()?
                .unwrap_or(DEFAULT_SOCKET_TIMEOUT),
        };
        let port = match cli.port {
            Some(value) => value,
            None => file("PORT")
                .map(|v| v.parse::<u16>().with_context(|| format!("PORT={v}")))
                .transpose()?
                .unwrap_or(DEFAULT_PORT),
        };
        let host_raw = non_empty(cli.host)
            .or_else(|| file("HOST"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host_raw
            .parse::<IpAddr>()
            .with_context(|| format!("invalid HOST {host_raw}"))?;

        Ok(Self {
            api_key,
            api_base,
            media_root,
            cookies_path,
            ytdlp_path,
            proxy,
            socket_timeout,
            host,
            port,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
