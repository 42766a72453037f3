use crate::error::{ConvertError, ConvertResult};
use regex::Regex;
use url::Url;

/// Recognises the YouTube URL shapes that can be converted
pub struct YouTubeParser {
    video_id_regex: Regex,
    youtube_domains: Vec<&'static str>,
}

impl Default for YouTubeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl YouTubeParser {
    pub fn new() -> Self {
        // YouTube video ID pattern: 11 characters, alphanumeric plus - and _
        let video_id_regex = Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("Valid video ID regex");

        let youtube_domains = vec![
            "youtube.com",
            "www.youtube.com",
            "m.youtube.com",
            "music.youtube.com",
            "youtu.be",
            "youtube-nocookie.com",
            "www.youtube-nocookie.com",
        ];

        Self {
            video_id_regex,
            youtube_domains,
        }
    }

    /// Whether the string is a convertible video URL. Never fails.
    pub fn is_supported_url(&self, url_str: &str) -> bool {
        self.parse_url(url_str).is_ok()
    }

    /// Parse a YouTube URL and extract the video ID
    pub fn parse_url(&self, url_str: &str) -> ConvertResult<String> {
        let trimmed = url_str.trim();
        if trimmed.is_empty() {
            return Err(ConvertError::MissingInput);
        }

        let url = Url::parse(trimmed).map_err(|_| unsupported(url_str))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(unsupported(url_str));
        }

        let domain = url.domain().ok_or_else(|| unsupported(url_str))?;
        let domain = domain.to_ascii_lowercase();
        if !self.youtube_domains.contains(&domain.as_str()) {
            return Err(unsupported(url_str));
        }

        let video_id = if domain == "youtu.be" {
            // youtu.be/VIDEO_ID
            url.path_segments()
                .and_then(|mut segments| segments.next())
                .map(str::to_string)
        } else {
            self.extract_from_watch_url(&url)
                .or_else(|| self.extract_from_path(&url))
        };

        match video_id {
            Some(id) if self.is_valid_video_id(&id) => Ok(id),
            _ => Err(unsupported(url_str)),
        }
    }

    /// /watch?v=VIDEO_ID
    fn extract_from_watch_url(&self, url: &Url) -> Option<String> {
        if url.path() != "/watch" {
            return None;
        }

        url.query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.to_string())
    }

    /// /embed/ID, /shorts/ID, /live/ID and /v/ID
    fn extract_from_path(&self, url: &Url) -> Option<String> {
        let segments: Vec<&str> = url.path_segments()?.collect();

        match segments.as_slice() {
            [prefix, id, ..] if matches!(*prefix, "embed" | "shorts" | "live" | "v") => {
                Some(id.to_string())
            }
            _ => None,
        }
    }

    pub fn is_valid_video_id(&self, video_id: &str) -> bool {
        self.video_id_regex.is_match(video_id)
    }

    /// Normalize a URL to the canonical watch form
    pub fn normalize_url(&self, url_str: &str) -> ConvertResult<String> {
        let video_id = self.parse_url(url_str)?;
        Ok(format!("https://www.youtube.com/watch?v={}", video_id))
    }
}

fn unsupported(url: &str) -> ConvertError {
    ConvertError::UnsupportedUrl {
        url: url.to_string(),
    }
}

/// Convenience function to check a URL with the default parser
pub fn is_supported_url(url: &str) -> bool {
    YouTubeParser::new().is_supported_url(url)
}
