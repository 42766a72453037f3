//! Static serving for the single-page front end.
//!
//! Built assets get a far-future immutable cache policy. Any other GET is
//! answered with `index.html` and caching disabled so client-side routes
//! always load the latest entry document.

use axum::Router;
use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use std::path::Path;
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;

const IMMUTABLE: &str = "public, max-age=31536000, immutable";
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

pub fn router(static_dir: &Path) -> Router {
    let index = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(NO_CACHE),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .service(ServeFile::new(static_dir.join("index.html")));

    // index responses already carry Cache-Control, so only real files get this
    let files = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(IMMUTABLE),
        ))
        .service(
            ServeDir::new(static_dir)
                .append_index_html_on_directories(false)
                .fallback(index.clone()),
        );

    // the entry document is never cached, even when requested by name
    Router::new()
        .route_service("/index.html", index)
        .fallback_service(files)
}
