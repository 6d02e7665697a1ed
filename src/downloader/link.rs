// Link validation and video id extraction
//
// Two stages on purpose: `validate` only checks shape and host, while
// `extract_id` rejects allowed links that carry no video id.

use url::Url;

use super::errors::DownloadError;
use super::models::VideoIdentifier;

/// Hosts accepted as video page links
pub const ALLOWED_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

const SHORT_LINK_HOST: &str = "youtu.be";

/// Path prefixes that carry the id as the next segment
const ID_PATH_PREFIXES: &[&str] = &["shorts", "embed", "live"];

fn parse_allowed(url: &str) -> Option<Url> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    if ALLOWED_HOSTS.contains(&host.as_str()) {
        Some(parsed)
    } else {
        None
    }
}

/// True when `url` is an absolute http(s) URL on an allowed host.
pub fn validate(url: &str) -> bool {
    parse_allowed(url).is_some()
}

/// Pull the video id out of a link.
///
/// `youtu.be/<id>` uses the first path segment; every other allowed host uses
/// the `v` query parameter, falling back to `/shorts/<id>`, `/embed/<id>` and
/// `/live/<id>`.
pub fn extract_id(url: &str) -> Result<VideoIdentifier, DownloadError> {
    let parsed = parse_allowed(url).ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))?;
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

    let id = if host == SHORT_LINK_HOST {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_string)
    } else {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .or_else(|| id_from_path(&parsed))
    };

    match id {
        Some(id) if !id.trim().is_empty() => Ok(VideoIdentifier::new(id.trim())),
        _ => Err(DownloadError::InvalidUrl(url.to_string())),
    }
}

fn id_from_path(parsed: &Url) -> Option<String> {
    let mut segments = parsed.path_segments()?;
    let prefix = segments.next()?;
    if ID_PATH_PREFIXES.contains(&prefix) {
        segments.next().map(str::to_string)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_malformed_and_foreign() {
        assert!(!validate("not a url"));
        assert!(!validate("/watch?v=abc"));
        assert!(!validate("https://vimeo.com/12345"));
        assert!(!validate("https://youtube.com.evil.example/watch?v=abc"));
        assert!(!validate("ftp://www.youtube.com/watch?v=abc"));
        assert!(!validate(""));
    }

    #[test]
    fn test_validate_accepts_allowed_hosts() {
        assert!(validate("https://www.youtube.com/watch?v=abc123"));
        assert!(validate("https://youtu.be/abc123"));
        assert!(validate("http://m.youtube.com/watch?v=abc123"));
        assert!(validate("https://WWW.YouTube.com/watch?v=abc123"));
    }

    #[test]
    fn test_validate_accepts_link_without_id() {
        // second stage rejects it
        assert!(validate("https://www.youtube.com/feed/trending"));
        assert!(extract_id("https://www.youtube.com/feed/trending").is_err());
    }

    #[test]
    fn test_extract_id_from_query() {
        let id = extract_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_extract_id_from_short_link() {
        let id = extract_id("https://youtu.be/dQw4w9WgXcQ?si=tracking").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn test_extract_id_from_shorts_path() {
        let id = extract_id("https://www.youtube.com/shorts/abcDEF12345").unwrap();
        assert_eq!(id.as_str(), "abcDEF12345");
    }

    #[test]
    fn test_extract_id_empty_values_fail() {
        assert_eq!(
            extract_id("https://www.youtube.com/watch?v="),
            Err(DownloadError::InvalidUrl(
                "https://www.youtube.com/watch?v=".to_string()
            ))
        );
        assert!(extract_id("https://youtu.be/").is_err());
        assert!(extract_id("https://example.com/watch?v=abc").is_err());
    }
}
