// FormatSelector - turns raw yt-dlp encodings into the curated tier list
//
// Keeps the engine's ordering. At most one entry per quality string survives;
// later encodings at the same nominal quality (other bitrate/codec) are
// dropped.

use std::collections::HashSet;

use super::extractors::ExtendedFormat;
use super::models::FormatEntry;

/// Only encodings in this container are offered
pub const TARGET_CONTAINER: &str = "mp4";

/// Tier substrings a quality string must contain to be listed
pub const QUALITY_TIERS: &[&str] = &[
    "144p", "240p", "360p", "480p", "720p", "1080p", "Premium",
];

pub const UNKNOWN_SIZE: &str = "Unknown size";

/// Label used for naming when neither note nor resolution is known
pub const UNKNOWN_QUALITY: &str = "unknown_quality";

pub struct FormatSelector;

impl FormatSelector {
    /// Filter, dedupe and label the engine's encodings
    pub fn build_entries(formats: &[ExtendedFormat]) -> Vec<FormatEntry> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();

        for format in formats {
            if format.ext != TARGET_CONTAINER {
                continue;
            }

            let note = format.format_note.as_deref();
            let Some(quality) = Self::display_quality(note, format.resolution.as_deref()) else {
                continue;
            };

            if !QUALITY_TIERS.iter().any(|tier| quality.contains(tier)) {
                continue;
            }

            if !seen.insert(quality.to_string()) {
                continue;
            }

            entries.push(FormatEntry {
                format_id: format.format_id.clone(),
                container: format.ext.clone(),
                resolution_label: quality.to_string(),
                size_label: Self::format_size(format.effective_size()),
            });
        }

        entries
    }

    /// Format note when present, else the raw resolution string
    pub fn display_quality<'a>(
        note: Option<&'a str>,
        resolution: Option<&'a str>,
    ) -> Option<&'a str> {
        note.filter(|n| !n.trim().is_empty())
            .or_else(|| resolution.filter(|r| !r.trim().is_empty()))
    }

    /// Quality label used in output file names
    pub fn quality_label(note: Option<&str>, resolution: Option<&str>) -> String {
        Self::display_quality(note, resolution)
            .unwrap_or(UNKNOWN_QUALITY)
            .to_string()
    }

    /// Format file size for display (bytes / 1024 / 1024, two decimals)
    pub fn format_size(bytes: Option<u64>) -> String {
        match bytes {
            Some(b) if b > 0 => format!("{:.2} MB", b as f64 / 1024.0 / 1024.0),
            _ => UNKNOWN_SIZE.to_string(),
        }
    }
}
