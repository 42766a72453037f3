use thiserror::Error;

/// Errors raised while validating, probing, resolving or converting a video
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("URL is required")]
    MissingInput,

    #[error("Unsupported video URL: {url}")]
    UnsupportedUrl { url: String },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Failed to retrieve video metadata: {message}")]
    MetadataFetchFailed { message: String },

    #[error("No suitable {format} stream available")]
    NoSuitableStream { format: String },

    #[error("Conversion failed: {message}")]
    ConversionFailed { message: String },

    #[error("Upstream transport error: {source}")]
    UpstreamTransport {
        #[from]
        source: reqwest::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ConvertError {
    /// Whether the caller is at fault (bad or missing input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvertError::MissingInput
                | ConvertError::UnsupportedUrl { .. }
                | ConvertError::UnsupportedFormat { .. }
        )
    }

    /// Short message that is safe to show to end users.
    ///
    /// Internal details such as subprocess stderr stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ConvertError::MissingInput => "URL is required".to_string(),
            ConvertError::UnsupportedUrl { .. } => "Invalid YouTube URL".to_string(),
            ConvertError::UnsupportedFormat { format } => {
                format!("Unsupported format: {}", format)
            }
            ConvertError::MetadataFetchFailed { .. } => {
                "Failed to retrieve video information".to_string()
            }
            ConvertError::NoSuitableStream { format } => {
                format!("No suitable stream found for {}", format)
            }
            ConvertError::ConversionFailed { .. }
            | ConvertError::UpstreamTransport { .. }
            | ConvertError::Io { .. } => "Failed to convert video".to_string(),
            ConvertError::Configuration { .. } => "Server configuration error".to_string(),
        }
    }
}

pub type ConvertResult<T> = Result<T, ConvertError>;
