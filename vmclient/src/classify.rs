//! Status-code driven response classification.
//!
//! The body is read exactly once, here, and the stream is dropped before
//! returning on every path. A 200 hands the bytes on for decoding; anything
//! else becomes a [`ResponseError`].

use std::io::Read;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{ResponseError, Result, TransportError, VmClientError};
use crate::transport::HttpResponse;

/// Generic message for statuses the client does not handle.
pub const UNEXPECTED_RESPONSE: &str = "unexpected response";

/// Message used when the body of a failed response could not be read.
pub const BODY_READ_FAILED: &str = "error reading body";

/// Body of a 422 response.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    status: String,
    #[serde(default, rename = "errorType")]
    error_type: String,
    #[serde(default, rename = "error")]
    message: String,
}

/// Classifies a query response.
///
/// - 200: returns the body bytes.
/// - 422: parses `{status, errorType, error}` into a query error; an
///   unparsable body becomes an unexpected-response error carrying the parse
///   failure as its source.
/// - anything else: an unexpected-response error with the raw body.
///
/// # Errors
///
/// Returns `VmClientError::Response` for any non-200 status, and
/// `VmClientError::Transport` if a 200 body cannot be read.
pub fn classify(response: HttpResponse) -> Result<Vec<u8>> {
    let status = response.status;
    let raw = match read_body(response) {
        Ok(raw) => raw,
        Err(e) if status == StatusCode::OK.as_u16() => {
            return Err(TransportError::Io { source: e }.into());
        }
        Err(e) => {
            return Err(ResponseError::unexpected(status, BODY_READ_FAILED, "")
                .with_source(e)
                .into());
        }
    };

    if status == StatusCode::OK.as_u16() {
        return Ok(raw);
    }

    let text = String::from_utf8_lossy(&raw).into_owned();
    if status == StatusCode::UNPROCESSABLE_ENTITY.as_u16() {
        return match serde_json::from_slice::<ErrorResponse>(&raw) {
            Ok(parsed) => {
                tracing::debug!(
                    status = %parsed.status,
                    error_type = %parsed.error_type,
                    "query rejected"
                );
                Err(ResponseError::query(status, parsed.message, text).into())
            }
            Err(e) => Err(ResponseError::unexpected(
                status,
                format!("error parsing response: {e}"),
                text,
            )
            .with_source(e)
            .into()),
        };
    }

    Err(ResponseError::unexpected(status, UNEXPECTED_RESPONSE, text).into())
}

/// Classifies a health-check response.
///
/// Any non-200 status is an unexpected-response error; the body is never
/// interpreted.
///
/// # Errors
///
/// Returns `VmClientError::Response` for any non-200 status, and
/// `VmClientError::Transport` if a 200 body cannot be drained.
pub fn classify_health(response: HttpResponse) -> Result<()> {
    let status = response.status;
    let message = format!("unexpected status code {}", status_line(status));
    match read_body(response) {
        Ok(_) if status == StatusCode::OK.as_u16() => Ok(()),
        Ok(raw) => Err(ResponseError::unexpected(
            status,
            message,
            String::from_utf8_lossy(&raw).into_owned(),
        )
        .into()),
        Err(e) if status == StatusCode::OK.as_u16() => {
            Err(VmClientError::Transport(TransportError::Io { source: e }))
        }
        Err(e) => Err(ResponseError::unexpected(status, message, "")
            .with_source(e)
            .into()),
    }
}

/// Classifies an import response. Any 2xx status is success.
///
/// # Errors
///
/// Returns `VmClientError::Response` for any other status, and
/// `VmClientError::Transport` if a 2xx body cannot be drained.
pub fn classify_push(response: HttpResponse) -> Result<()> {
    let status = response.status;
    let success = StatusCode::from_u16(status).is_ok_and(|s| s.is_success());
    match read_body(response) {
        Ok(_) if success => Ok(()),
        Ok(raw) => Err(ResponseError::unexpected(
            status,
            UNEXPECTED_RESPONSE,
            String::from_utf8_lossy(&raw).into_owned(),
        )
        .into()),
        Err(e) if success => Err(VmClientError::Transport(TransportError::Io { source: e })),
        Err(e) => Err(ResponseError::unexpected(status, BODY_READ_FAILED, "")
            .with_source(e)
            .into()),
    }
}

/// Drains and drops the body.
fn read_body(mut response: HttpResponse) -> std::io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    response.body.read_to_end(&mut raw)?;
    Ok(raw)
}

/// `404 Not Found`, or just the number for unknown codes.
fn status_line(status: u16) -> String {
    match StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("{status} {reason}"),
        None => status.to_string(),
    }
}
