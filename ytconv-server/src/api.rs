//! HTTP API: conversion requests, file streaming and metadata lookup.

use crate::assets;
use axum::{
    Json, Router,
    body::Body,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use ytconv::{ConversionRequest, ConvertError, Converter, TargetFormat, VideoMetadata};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<Converter>,
}

impl AppState {
    pub fn new(converter: Converter) -> Self {
        Self {
            converter: Arc::new(converter),
        }
    }
}

/// Build the application router: API routes first, static front end as fallback
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/api/download", post(request_download))
        .route("/api/download-file", get(download_file))
        .route("/api/info", get(video_info))
        .with_state(state)
        .merge(assets::router(static_dir))
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    url: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    success: bool,
    title: String,
    download_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    url: Option<String>,
    format: Option<String>,
}

/// Error body returned to clients as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        let status = if err.is_client_error() {
            warn!("Rejected request: {}", err);
            StatusCode::BAD_REQUEST
        } else {
            error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        };

        Self {
            status,
            message: err.user_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_format(format: Option<&str>) -> Result<TargetFormat, ConvertError> {
    match format.map(str::trim).filter(|f| !f.is_empty()) {
        Some(format) => format.parse(),
        None => Ok(TargetFormat::default()),
    }
}

/// Relative link the browser follows to fetch the converted file
pub fn download_url(url: &str, format: TargetFormat) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", url)
        .append_pair("format", format.extension())
        .finish();
    format!("/api/download-file?{}", query)
}

/// POST /api/download: validate, look up the title and hand back a file link
async fn request_download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<Json<DownloadResponse>> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Unreadable download request: {}", rejection);
            return Err(ConvertError::MissingInput.into());
        }
    };

    let url = state.converter.validate(request.url.as_deref())?;
    let format = parse_format(request.format.as_deref())?;
    let metadata = state.converter.fetch_metadata(url).await?;

    info!("Prepared {} download for \"{}\"", format, metadata.title);
    Ok(Json(DownloadResponse {
        success: true,
        title: metadata.title,
        download_url: download_url(url, format),
    }))
}

/// GET /api/download-file: stream the converted file as an attachment
async fn download_file(
    State(state): State<AppState>,
    query: Result<Query<ConvertQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Ok(Query(query)) = query else {
        return Err(ConvertError::MissingInput.into());
    };

    let url = state.converter.validate(query.url.as_deref())?;
    let format = parse_format(query.format.as_deref())?;
    let output = state
        .converter
        .convert(&ConversionRequest::new(url, format))
        .await?;

    info!("Streaming {} as {}", url, output.filename);
    let source = url.to_string();
    let body = Body::from_stream(
        output
            .stream
            .inspect_err(move |e| error!("Stream for {} ended early: {}", source, e)),
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, output.content_type)
        .header(CONTENT_DISPOSITION, output.content_disposition)
        .body(body)
        .map_err(|e| {
            ApiError::from(ConvertError::ConversionFailed {
                message: format!("invalid response headers: {}", e),
            })
        })
}

/// GET /api/info: live metadata for a video
async fn video_info(
    State(state): State<AppState>,
    query: Result<Query<ConvertQuery>, QueryRejection>,
) -> ApiResult<Json<VideoMetadata>> {
    let Ok(Query(query)) = query else {
        return Err(ConvertError::MissingInput.into());
    };

    let url = state.converter.validate(query.url.as_deref())?;
    let metadata = state.converter.fetch_metadata(url).await?;
    Ok(Json(metadata))
}
