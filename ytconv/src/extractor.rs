use crate::error::{ConvertError, ConvertResult};
use crate::parser::YouTubeParser;
use crate::types::{ConvertOptions, StreamFormat, VideoInfo, VideoMetadata};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Byte stream of a source media file
pub type ByteStream = BoxStream<'static, ConvertResult<Bytes>>;

/// Capability that turns a public video URL into metadata and media streams
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// URL classifier; must not touch the network
    fn supports_url(&self, url: &str) -> bool;

    /// Fetch live metadata and the list of available source streams
    async fn probe(&self, url: &str) -> ConvertResult<VideoInfo>;

    async fn fetch_metadata(&self, url: &str) -> ConvertResult<VideoMetadata> {
        Ok(self.probe(url).await?.metadata)
    }

    /// Open one source stream for reading
    async fn open_stream(&self, format: &StreamFormat) -> ConvertResult<ByteStream>;
}

/// Extraction engine backed by the yt-dlp executable
pub struct YtDlpExtractor {
    ytdlp_path: String,
    proxy: Option<String>,
    user_agent: Option<String>,
    client: Client,
    parser: YouTubeParser,
}

impl YtDlpExtractor {
    pub fn new(options: &ConvertOptions) -> ConvertResult<Self> {
        let mut client_builder = Client::builder()
            .connect_timeout(Duration::from_secs(options.connect_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(user_agent) = &options.user_agent {
            client_builder = client_builder.user_agent(user_agent.clone());
        }

        if let Some(proxy_url) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| ConvertError::Configuration {
                message: format!("Invalid proxy URL: {}", e),
            })?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder
            .build()
            .map_err(|e| ConvertError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            ytdlp_path: options.ytdlp_path.clone(),
            proxy: options.proxy.clone(),
            user_agent: options.user_agent.clone(),
            client,
            parser: YouTubeParser::new(),
        })
    }

    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = ["--dump-single-json", "--no-playlist", "--no-warnings"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        if let Some(user_agent) = &self.user_agent {
            args.push("--user-agent".to_string());
            args.push(user_agent.clone());
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn supports_url(&self, url: &str) -> bool {
        self.parser.is_supported_url(url)
    }

    async fn probe(&self, url: &str) -> ConvertResult<VideoInfo> {
        // playlist and tracking parameters never reach yt-dlp
        let target = self.parser.normalize_url(url)?;
        info!("Probing video info for: {}", target);

        let output = Command::new(&self.ytdlp_path)
            .args(self.build_args(&target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ConvertError::MetadataFetchFailed {
                message: format!("failed to run {}: {}", self.ytdlp_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp exited with {}: {}", output.status, stderr.trim());
            return Err(ConvertError::MetadataFetchFailed {
                message: format!("yt-dlp exited with {}", output.status),
            });
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let info = parse_info(&json)?;

        debug!(
            "Found {} formats for \"{}\"",
            info.formats.len(),
            info.metadata.title
        );

        Ok(info)
    }

    async fn open_stream(&self, format: &StreamFormat) -> ConvertResult<ByteStream> {
        debug!("Opening source stream {} ({})", format.format_id, format.ext);

        let mut request = self.client.get(&format.url);
        for (key, value) in &format.http_headers {
            request = request.header(key.as_str(), value.as_str());
        }
        request = request.header(reqwest::header::ACCEPT_ENCODING, "identity");

        let response = request.send().await?.error_for_status()?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ConvertError::from))
            .boxed())
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<RawThumbnail>,
    uploader: Option<String>,
    channel: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
    url: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    tbr: Option<f64>,
    abr: Option<f64>,
    vbr: Option<f64>,
    height: Option<u32>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the JSON document printed by `yt-dlp --dump-single-json`
pub fn parse_info(json: &str) -> ConvertResult<VideoInfo> {
    let raw: RawInfo = serde_json::from_str(json).map_err(|e| ConvertError::MetadataFetchFailed {
        message: format!("invalid yt-dlp output: {}", e),
    })?;

    let missing = |field: &str| ConvertError::MetadataFetchFailed {
        message: format!("missing {}", field),
    };

    let title = non_empty(raw.title).ok_or_else(|| missing("title"))?;
    // yt-dlp lists thumbnails from worst to best
    let thumbnail_url = non_empty(raw.thumbnail)
        .or_else(|| raw.thumbnails.into_iter().rev().find_map(|t| non_empty(t.url)))
        .ok_or_else(|| missing("thumbnail"))?;
    let author = non_empty(raw.uploader)
        .or_else(|| non_empty(raw.channel))
        .ok_or_else(|| missing("author"))?;
    let duration_seconds = raw
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d as u64)
        .unwrap_or(0);

    let formats = raw
        .formats
        .into_iter()
        .enumerate()
        .map(|(order, f)| StreamFormat {
            format_id: f.format_id.unwrap_or_else(|| order.to_string()),
            url: f.url.unwrap_or_default(),
            ext: f.ext.unwrap_or_default(),
            vcodec: f.vcodec,
            acodec: f.acodec,
            bitrate_kbps: f.tbr.or(f.abr).or(f.vbr),
            height: f.height,
            protocol: f.protocol,
            http_headers: f.http_headers,
            order,
        })
        .collect();

    Ok(VideoInfo {
        metadata: VideoMetadata {
            title,
            duration_seconds,
            thumbnail_url,
            author,
        },
        formats,
    })
}
