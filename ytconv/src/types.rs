use crate::error::{ConvertError, ConvertResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Output container requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    Mp3,
    Mp4,
}

impl TargetFormat {
    /// MIME type declared on the streamed response
    pub fn content_type(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "audio/mpeg",
            TargetFormat::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Mp3 => "mp3",
            TargetFormat::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(TargetFormat::Mp3),
            "mp4" => Ok(TargetFormat::Mp4),
            _ => Err(ConvertError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// A single conversion request, created per API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub url: String,
    pub format: TargetFormat,
}

impl ConversionRequest {
    pub fn new(url: impl Into<String>, format: TargetFormat) -> Self {
        Self {
            url: url.into(),
            format,
        }
    }
}

/// Video metadata as exposed by the info endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    #[serde(rename = "duration")]
    pub duration_seconds: u64,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: String,
    pub author: String,
}

/// One source stream reported by the extraction engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamFormat {
    pub format_id: String,
    pub url: String,
    /// Container extension, e.g. `mp4`, `webm`, `m4a`
    pub ext: String,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Declared total bitrate in kbps
    pub bitrate_kbps: Option<f64>,
    pub height: Option<u32>,
    pub protocol: Option<String>,
    pub http_headers: HashMap<String, String>,
    /// Position in the platform's preference order (higher is preferred)
    pub order: usize,
}

fn codec_present(codec: &Option<String>) -> bool {
    codec
        .as_deref()
        .is_some_and(|c| !c.is_empty() && c != "none")
}

impl StreamFormat {
    pub fn has_video(&self) -> bool {
        codec_present(&self.vcodec)
    }

    pub fn has_audio(&self) -> bool {
        codec_present(&self.acodec)
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }

    pub fn is_video_only(&self) -> bool {
        self.has_video() && !self.has_audio()
    }

    pub fn is_combined(&self) -> bool {
        self.has_video() && self.has_audio()
    }

    pub fn is_h264(&self) -> bool {
        self.vcodec
            .as_deref()
            .is_some_and(|c| c.starts_with("avc1") || c.starts_with("h264"))
    }

    pub fn is_aac(&self) -> bool {
        self.acodec
            .as_deref()
            .is_some_and(|c| c.starts_with("mp4a") || c.starts_with("aac"))
    }

    /// Already an MP4 with H.264 video and AAC audio, playable as-is
    pub fn is_mp4_compatible(&self) -> bool {
        self.ext == "mp4" && self.is_h264() && self.is_aac()
    }

    /// Whether the stream can be fetched with a plain HTTP GET.
    ///
    /// Manifests (HLS, DASH segment lists) and storyboard images are excluded.
    pub fn is_directly_fetchable(&self) -> bool {
        if self.url.is_empty() || self.ext == "mhtml" {
            return false;
        }
        match self.protocol.as_deref() {
            None => true,
            Some(p) => p == "https" || p == "http",
        }
    }
}

/// Metadata and stream formats gathered in one probe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub metadata: VideoMetadata,
    pub formats: Vec<StreamFormat>,
}

/// Source stream(s) chosen for a conversion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSelection {
    /// Audio-only source, used for mp3
    AudioOnly { audio: StreamFormat },
    /// Single stream carrying both audio and video
    Combined { source: StreamFormat },
    /// Video-only plus audio-only, muxed during conversion
    Separate {
        video: StreamFormat,
        audio: StreamFormat,
    },
}

impl StreamSelection {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamSelection::AudioOnly { .. } => "audio-only",
            StreamSelection::Combined { .. } => "combined",
            StreamSelection::Separate { .. } => "separate",
        }
    }
}

/// Options for the conversion service
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Path or name of the yt-dlp binary
    pub ytdlp_path: String,
    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: String,
    /// Target MP3 bitrate in kbps
    pub audio_bitrate_kbps: u32,
    /// Custom user agent for upstream requests
    pub user_agent: Option<String>,
    /// Proxy URL for upstream requests
    pub proxy: Option<String>,
    /// Connect timeout for passthrough downloads
    pub connect_timeout_seconds: u64,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            audio_bitrate_kbps: 192,
            user_agent: None,
            proxy: None,
            connect_timeout_seconds: 30,
        }
    }
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ytdlp_path(mut self, path: &str) -> Self {
        self.ytdlp_path = path.to_string();
        self
    }

    pub fn ffmpeg_path(mut self, path: &str) -> Self {
        self.ffmpeg_path = path.to_string();
        self
    }

    pub fn audio_bitrate(mut self, kbps: u32) -> Self {
        self.audio_bitrate_kbps = kbps;
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    pub fn proxy(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_string());
        self
    }

    pub fn connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout_seconds = seconds;
        self
    }

    pub(crate) fn validate(&self) -> ConvertResult<()> {
        if self.audio_bitrate_kbps == 0 {
            return Err(ConvertError::Configuration {
                message: "audio bitrate must be positive".to_string(),
            });
        }
        if self.ytdlp_path.trim().is_empty() || self.ffmpeg_path.trim().is_empty() {
            return Err(ConvertError::Configuration {
                message: "tool paths must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
