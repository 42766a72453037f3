pub mod error;
pub mod extractor;
pub mod parser;
pub mod processor;
pub mod resolver;
pub mod types;

pub use error::{ConvertError, ConvertResult};
pub use extractor::{ByteStream, MediaExtractor, YtDlpExtractor};
pub use processor::{ConversionOutput, ConversionPipeline, ConversionStream};
pub use resolver::StreamResolver;
pub use types::{
    ConversionRequest, ConvertOptions, StreamFormat, StreamSelection, TargetFormat, VideoInfo,
    VideoMetadata,
};

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Main orchestrator: validate, look up, resolve and convert
pub struct Converter {
    options: ConvertOptions,
    extractor: Arc<dyn MediaExtractor>,
    resolver: StreamResolver,
    pipeline: ConversionPipeline,
}

impl Converter {
    /// Create a converter backed by yt-dlp and ffmpeg
    pub fn new(options: ConvertOptions) -> ConvertResult<Self> {
        options.validate()?;
        let extractor = Arc::new(YtDlpExtractor::new(&options)?);
        Ok(Self::with_extractor(options, extractor))
    }

    /// Create a converter with a custom extraction engine
    pub fn with_extractor(options: ConvertOptions, extractor: Arc<dyn MediaExtractor>) -> Self {
        info!("Initializing converter with {} extractor", extractor.name());

        let pipeline = ConversionPipeline::new(&options);
        Self {
            options,
            extractor,
            resolver: StreamResolver::new(),
            pipeline,
        }
    }

    /// Check presence and shape of a caller-supplied URL
    pub fn validate<'a>(&self, url: Option<&'a str>) -> ConvertResult<&'a str> {
        let url = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConvertError::MissingInput)?;

        if !self.extractor.supports_url(url) {
            return Err(ConvertError::UnsupportedUrl {
                url: url.to_string(),
            });
        }

        Ok(url)
    }

    /// Live metadata for a validated URL
    pub async fn fetch_metadata(&self, url: &str) -> ConvertResult<VideoMetadata> {
        info!("Fetching metadata for: {}", url);
        self.extractor.fetch_metadata(url).await
    }

    /// Metadata and stream formats in one upstream call
    pub async fn probe(&self, url: &str) -> ConvertResult<VideoInfo> {
        self.extractor.probe(url).await
    }

    pub fn resolve_streams(
        &self,
        info: &VideoInfo,
        format: TargetFormat,
    ) -> ConvertResult<StreamSelection> {
        self.resolver.resolve(&info.formats, format)
    }

    /// Probe, resolve and start streaming a conversion.
    ///
    /// Returns once the first output bytes are available, so every error
    /// reported here happened before anything was sent to the client.
    pub async fn convert(&self, request: &ConversionRequest) -> ConvertResult<ConversionOutput> {
        let url = self.validate(Some(request.url.as_str()))?;
        info!("Converting {} to {}", url, request.format);

        let info = self.probe(url).await?;
        let selection = self.resolve_streams(&info, request.format)?;
        debug!("Using {} selection: {:?}", selection.kind(), selection);

        self.pipeline
            .start(
                self.extractor.as_ref(),
                &selection,
                &info.metadata,
                request.format,
            )
            .await
    }

    /// Log versions of the external tools, warning about missing ones
    pub async fn check_tools(&self) -> bool {
        let mut available = true;

        for (program, flag) in [
            (self.options.ytdlp_path.as_str(), "--version"),
            (self.options.ffmpeg_path.as_str(), "-version"),
        ] {
            match processor::tool_version(program, flag).await {
                Ok(version) => info!("Found {}: {}", program, version),
                Err(e) => {
                    warn!("{} is not available: {}", program, e);
                    available = false;
                }
            }
        }

        available
    }
}
