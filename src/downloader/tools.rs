use serde::{Deserialize, Serialize};
use std::process::Command;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg uses a single dash
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Locates the external binaries the downloader shells out to
pub struct ToolManager {
    ytdlp_override: Option<String>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self { ytdlp_override: None }
    }

    /// Use an explicit yt-dlp path instead of searching for one
    pub fn with_ytdlp_path(path: Option<String>) -> Self {
        Self { ytdlp_override: path }
    }

    pub fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let (path, version) = self.detect_tool(tool_type);

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            version,
            is_available: path.is_some(),
            path,
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    /// Path to run yt-dlp with; falls back to the bare name so PATH lookup
    /// happens at spawn time.
    pub fn ytdlp_path(&self) -> String {
        self.detect_tool(ToolType::YtDlp)
            .0
            .unwrap_or_else(|| ToolType::YtDlp.as_str().to_string())
    }

    fn detect_tool(&self, tool_type: ToolType) -> (Option<String>, Option<String>) {
        if tool_type == ToolType::YtDlp {
            if let Some(path) = &self.ytdlp_override {
                let version = self.get_version(path, tool_type);
                let path = version.as_ref().map(|_| path.clone());
                return (path, version);
            }
        }

        let binary_name = tool_type.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];

        for path in common_paths {
            if std::path::Path::new(&path).exists() {
                let version = self.get_version(&path, tool_type);
                return (Some(path), version);
            }
        }

        // 2. Try PATH
        if let Ok(output) = Command::new("which").arg(binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    let version = self.get_version(&path, tool_type);
                    return (Some(path), version);
                }
            }
        }

        (None, None)
    }

    fn get_version(&self, path: &str, tool_type: ToolType) -> Option<String> {
        match Command::new(path).arg(tool_type.version_arg()).output() {
            Ok(output) if output.status.success() => {
                // ffmpeg prints a banner; the first line carries the version
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .map(|line| line.trim().to_string())
            }
            _ => None,
        }
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}
