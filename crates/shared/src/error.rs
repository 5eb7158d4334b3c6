//! Error taxonomy for the HTTP gateway and the realtime connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::EventKind;

/// `application/problem+json` body returned by `/api/*` failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProblemDetails {
    #[serde(rename = "type", default)]
    pub type_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// User-facing message from a problem body: `detail`, else `title`.
pub fn try_problem_detail(body: &str) -> Option<String> {
    let problem: ProblemDetails = serde_json::from_str(body).ok()?;
    problem
        .detail
        .into_iter()
        .chain(std::iter::once(problem.title))
        .find(|msg| !msg.trim().is_empty())
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Message suitable for showing to a user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { body, status } => {
                try_problem_detail(body).unwrap_or_else(|| format!("Request failed ({})", status))
            }
            other => other.to_string(),
        }
    }
}

/// Errors surfaced by the realtime connection.
///
/// Only `connect()` and `authenticate()` return these; every other failure is
/// absorbed and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// The socket failed to open or errored while open
    #[error("transport error: {0}")]
    Transport(String),
    #[error("socket is not connected")]
    NotConnected,
    /// The server rejected the handshake
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("authentication timed out after {}ms", .0.as_millis())]
    AuthTimeout(Duration),
    /// The side channel request failed before reaching a verdict
    #[error("auth request failed: {0}")]
    Api(ApiError),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}

/// Reasons an inbound frame is dropped. Never crosses the public API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unknown frame type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` payload: {reason}")]
    Payload { kind: EventKind, reason: String },
    #[error("failed to encode frame: {0}")]
    Encode(String),
}
