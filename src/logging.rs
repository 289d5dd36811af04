//! Middleware for logging requests and responses.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::Error;

/// The number of bytes of a body logged at the `info` level.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is
/// truncated and the full body is logged at the `debug` level.
///
/// Request bodies are buffered for logging only up to `max_body_bytes`,
/// larger requests are answered with `413 Payload Too Large` before reaching
/// a handler. Binary bodies such as receipt uploads are not buffered at all:
/// they are streamed to the handler and only their headers are logged.
pub async fn logging_middleware(
    State(max_body_bytes): State<usize>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    if is_binary(content_type(&parts.headers)) {
        tracing::info!("Received request: {parts:#?}\nbody: <streamed>");
        let response = next.run(Request::from_parts(parts, body)).await;
        return log_response(response).await;
    }

    let body_bytes = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(error) if error.is::<LengthLimitError>() => {
            tracing::warn!(
                "Rejected request to {} with a body over {max_body_bytes} bytes",
                parts.uri
            );
            return Error::PayloadTooLarge {
                limit: max_body_bytes,
            }
            .into_response();
        }
        Err(error) => {
            tracing::error!("Could not read request body: {error}");
            return (StatusCode::BAD_REQUEST, "could not read request body").into_response();
        }
    };

    log_body(
        &format!("Received request: {parts:#?}"),
        &parts.headers,
        &body_bytes,
    );

    let request = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(request).await;

    log_response(response).await
}

async fn log_response(response: Response) -> Response {
    let (parts, body) = response.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!("Could not read response body: {error}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    log_body(
        &format!("Sending response: {parts:#?}"),
        &parts.headers,
        &body_bytes,
    );

    Response::from_parts(parts, Body::from(body_bytes))
}

fn content_type(headers: &HeaderMap) -> &str {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn log_body(summary: &str, headers: &HeaderMap, body: &Bytes) {
    let content_type = content_type(headers);

    if is_binary(content_type) {
        tracing::info!("{summary}\nbody: <{} bytes of {content_type}>", body.len());
        return;
    }

    let body = String::from_utf8_lossy(body);

    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!("{summary}\nbody: {}...", truncate(&body, LOG_BODY_LENGTH_LIMIT));
        tracing::debug!("Full body: {body:?}");
    } else {
        tracing::info!("{summary}\nbody: {body:?}");
    }
}

fn is_binary(content_type: &str) -> bool {
    content_type.starts_with("multipart/")
        || content_type.starts_with("image/")
        || content_type.starts_with("application/octet-stream")
}

/// Cut `text` to at most `max_bytes` without splitting a character.
fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    &text[..end]
}
