use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{FragmentPayload, RecognizeRequest};
use super::state::ServerState;
use crate::data::{DataAttachment, decode_image_data};
use crate::error::RelayError;
use crate::providers::Provider;
use crate::relay::{RelayEvent, RelayHandle, open_relay};
use crate::settings::Settings;

/// Room for base64 expansion, the JSON envelope and a `data:` prefix.
const ENVELOPE_SLACK: usize = 64 * 1024;

pub async fn run_server<P: Provider>(settings: Arc<Settings>, provider: Option<P>) -> Result<()> {
    let addr = settings.addr.clone();
    if provider.is_none() {
        warn!("no API key configured; /api/recognize will answer 503");
    }
    let app = router(ServerState::new(settings, provider));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!(%addr, "relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router<P: Provider>(state: ServerState<P>) -> Router {
    let body_limit = state.settings.max_payload_bytes.div_ceil(3) * 4 + ENVELOPE_SLACK;
    Router::new()
        .route("/health", get(health::<P>))
        .route(
            "/api/recognize",
            post(recognize::<P>).fallback(method_not_allowed),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(state))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health<P: Provider>(State(state): State<Arc<ServerState<P>>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "configured": state.transcriber.is_some()
        })),
    )
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("POST,GET,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn method_not_allowed() -> Response {
    error_response(&RelayError::MethodNotAllowed, true)
}

async fn recognize<P: Provider>(
    State(state): State<Arc<ServerState<P>>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let production = state.settings.is_production();
    match start_relay(&state, body).await {
        Ok(handle) => event_stream(handle, production).into_response(),
        Err(err) => error_response(&err, production),
    }
}

/// Resolves once the upstream accepted the call, so open failures still get
/// their own status instead of an event on a 200 stream.
async fn start_relay<P: Provider>(
    state: &ServerState<P>,
    body: Result<Bytes, BytesRejection>,
) -> Result<RelayHandle, RelayError> {
    let (image, domain) = validate(&state.settings, body)?;
    let transcriber = state
        .transcriber
        .clone()
        .ok_or_else(|| RelayError::Configuration {
            details: "API_KEY is not configured".to_string(),
        })?;
    info!(
        mime = %image.mime,
        bytes = image.bytes.len(),
        domain = domain.as_deref().unwrap_or("-"),
        "starting transcription"
    );
    open_relay(transcriber, image, domain).await
}

/// Everything that can be rejected without calling the upstream.
fn validate(
    settings: &Settings,
    body: Result<Bytes, BytesRejection>,
) -> Result<(DataAttachment, Option<String>), RelayError> {
    let limit = settings.max_payload_bytes;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RelayError::PayloadTooLarge { limit }
        } else {
            RelayError::InvalidRequest(rejection.body_text())
        }
    })?;
    let request: RecognizeRequest = serde_json::from_slice(&body)
        .map_err(|err| RelayError::InvalidRequest(err.to_string()))?;
    if request.image_data.trim().is_empty() || request.mime_type.trim().is_empty() {
        return Err(RelayError::InvalidRequest(
            "imageData and mimeType are required".to_string(),
        ));
    }
    let (bytes, _) = decode_image_data(&request.image_data).map_err(|err| {
        RelayError::InvalidRequest(format!("imageData is not valid base64: {}", err))
    })?;

    let mime = request.mime_type.trim().to_lowercase();
    if !settings.accepts_mime(&mime) {
        return Err(RelayError::UnsupportedMediaType(mime));
    }
    if bytes.len() > limit {
        return Err(RelayError::PayloadTooLarge { limit });
    }

    let domain = request
        .domain
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    Ok((
        DataAttachment {
            bytes,
            mime,
            name: None,
        },
        domain,
    ))
}

fn error_response(err: &RelayError, production: bool) -> Response {
    warn!(code = err.code(), status = %err.status(), "request rejected");
    (err.status(), Json(err.body(production))).into_response()
}

/// A client disconnect drops the body, and with it the relay's drop guard.
fn event_stream(
    handle: RelayHandle,
    production: bool,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = handle
        .into_stream()
        .map(move |event| Ok(sse_event(event, production)));
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn sse_event(event: RelayEvent, production: bool) -> Event {
    match event {
        RelayEvent::Fragment(text) => Event::default().data(payload_json(&FragmentPayload {
            text,
            quality: None,
        })),
        RelayEvent::Done { quality } => Event::default().data(payload_json(&FragmentPayload {
            text: String::new(),
            quality: Some(quality),
        })),
        RelayEvent::Failed(err) => {
            warn!(code = err.code(), "stream ended with an error");
            Event::default()
                .event("error")
                .data(serde_json::to_string(&err.body(production)).unwrap_or_default())
        }
    }
}

fn payload_json(payload: &FragmentPayload) -> String {
    serde_json::to_string(payload).unwrap_or_default()
}
