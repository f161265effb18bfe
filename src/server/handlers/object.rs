use crate::{error::Result, metrics, server::state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, info};

/// Serve a manifest or segment through the cache
///
/// The first request for an object pulls it from origin; concurrent and
/// later requests share that single fetch until the object expires.
/// Anything that is neither a manifest nor a segment is served from the
/// static directory without touching the cache.
pub async fn serve_object(State(state): State<AppState>, req: Request) -> Result<Response> {
    let start = Instant::now();
    let method = req.method().clone();
    if method != Method::GET && method != Method::HEAD {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }

    let path = req.uri().path().to_string();
    let Some(request) = state.coordinator.resolve(&path)? else {
        debug!("Bypassing cache for {}", path);
        return Ok(serve_static(&state, req).await);
    };

    let class = request.class.as_str();
    info!("Serving {} ({})", request.key, class);

    match state.coordinator.deliver(&request).await {
        Ok(delivery) => {
            metrics::record_request(class, 200);
            metrics::record_duration(class, start);

            let content_type = delivery.content_type();
            let len = delivery.len;
            let body = if method == Method::HEAD {
                Body::empty()
            } else {
                Body::from_stream(delivery.into_stream())
            };

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, len.to_string()),
                ],
                body,
            )
                .into_response())
        }
        Err(e) => {
            metrics::record_request(class, e.status().as_u16());
            metrics::record_duration(class, start);
            Err(e)
        }
    }
}

async fn serve_static(state: &AppState, req: Request) -> Response {
    match ServeDir::new(&state.config.static_dir).oneshot(req).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
