use std::{collections::HashSet, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{RawQuery, State},
    http::{HeaderName, HeaderValue, Method, header::CONTENT_DISPOSITION, header::CONTENT_TYPE},
    middleware,
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::{cors::AllowOrigin, cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::{
    backend::{Extractor, MediaInfo},
    config::{RelayConfig, normalize_origin},
    error::ApiError,
    formats::FormatCode,
    guard::{API_KEY_HEADER, AccessGuard, require_api_key},
    relay,
    validate::AllowList,
};

const DEFAULT_FORMAT: &str = "mp4-720";

#[derive(Clone)]
pub struct AppState {
    pub guard: AccessGuard,
    pub allow_list: Arc<AllowList>,
    pub extractor: Arc<dyn Extractor>,
}

impl AppState {
    pub fn new(config: &RelayConfig, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            guard: AccessGuard::new(&config.api_key),
            allow_list: Arc::new(config.allow_list.clone()),
            extractor,
        }
    }

    fn validated_url<'a>(&self, raw: &'a str) -> Result<&'a str, ApiError> {
        let url = raw.trim();
        if url.is_empty() || !self.allow_list.permits(url) {
            return Err(ApiError::invalid_url());
        }
        Ok(url)
    }
}

#[derive(Debug, Default, Deserialize)]
struct InfoRequest {
    #[serde(default)]
    url: String,
}

/// `/download` parameters. Repeated keys keep their first value and unknown
/// keys are ignored, so no query string is ever rejected at this stage.
#[derive(Debug, Default, PartialEq)]
struct DownloadQuery {
    url: String,
    format: Option<String>,
}

impl DownloadQuery {
    fn parse(raw: Option<&str>) -> Self {
        let mut url = None;
        let mut format = None;
        for (key, value) in form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "url" if url.is_none() => url = Some(value.into_owned()),
                "format" if format.is_none() => format = Some(value.into_owned()),
                _ => {}
            }
        }

        Self {
            url: url.unwrap_or_default(),
            format,
        }
    }
}

/// Assembles the relay. Every route sits behind the API key guard; CORS is
/// only added when origins are configured.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/info", post(info))
        .route("/download", get(download))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if allowed_origins.is_empty() {
        router
    } else {
        router.layer(build_cors_layer(allowed_origins))
    }
}

async fn info(State(state): State<AppState>, body: Bytes) -> Result<Json<MediaInfo>, ApiError> {
    let request = serde_json::from_slice::<InfoRequest>(&body).unwrap_or_default();
    let url = state.validated_url(&request.url)?;

    let media = state.extractor.probe(url).await.inspect_err(|error| {
        warn!(
            "{} backend could not probe {url:?}: {}",
            state.extractor.name(),
            error.message
        );
    })?;

    info!(
        "Probed {url:?}: {} format(s) offered",
        media.formats.len()
    );
    Ok(Json(media))
}

async fn download(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let query = DownloadQuery::parse(raw.as_deref());
    let url = state.validated_url(&query.url)?;
    let format = FormatCode::parse(query.format.as_deref().unwrap_or(DEFAULT_FORMAT))
        .ok_or_else(ApiError::invalid_format)?;

    info!("Download of {url:?} as {format} via {} backend", state.extractor.name());
    let source = state.extractor.fetch(url, format).await.inspect_err(|error| {
        warn!(
            "{} backend could not fetch {url:?} as {format}: {}",
            state.extractor.name(),
            error.message
        );
    })?;

    relay::attachment(source, format).await
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed: HashSet<String> = allowed_origins.iter().cloned().collect();
    info!("CORS enabled for {} origin(s)", allowed.len());

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin_permitted(&allowed, origin)
        }))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
        .expose_headers([CONTENT_DISPOSITION])
}

/// Origins are compared in their normalized `scheme://host[:port]` form.
fn origin_permitted(allowed: &HashSet<String>, origin: &HeaderValue) -> bool {
    let Some(normalized) = origin.to_str().ok().and_then(normalize_origin) else {
        debug!("Refusing malformed CORS origin {origin:?}");
        return false;
    };

    if allowed.contains(&normalized) {
        true
    } else {
        debug!("Refusing CORS origin {normalized}");
        false
    }
}
