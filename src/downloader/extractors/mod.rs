// Extraction engine adapters
//
// `InfoExtractor` answers metadata-only questions, `MediaEngine` fetches the
// bytes. `YtDlpCli` implements both on top of the yt-dlp binary.

mod cli;
mod traits;

pub use cli::YtDlpCli;
pub use traits::{ExtendedFormat, ExtendedVideoInfo, ExtractorConfig, InfoExtractor, MediaEngine};
