//! Error types for the admin API client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because callers frequently distinguish
//! "the resource does not exist" from "the server returned an unexpected
//! status." All other non-2xx responses land in `HttpError` with the raw
//! status code and body for debugging.
//!
//! Network-level failures (`Transport`, `HttpError`, `NotFound`) are usually
//! recovered by a resource client's `error` hook. `Parse` and
//! `CallbackNotConfigured` always reach the caller.

use thiserror::Error;

/// Errors produced by the token manager, resource clients and transports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The request never produced a response (connection refused, DNS, timeout).
    #[error("transport failed: {0}")]
    Transport(String),

    /// A URL could not be built from the configured endpoint.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// A hook was invoked for an action declared manual without a per-call override.
    #[error("the action \"{action}\" has no \"{hook}\" callback")]
    CallbackNotConfigured { action: String, hook: &'static str },

    /// A `parse` hook rejected a wire-shape record.
    #[error("parser of \"{endpoint}\" failed on action \"{action}\": {message}")]
    Parse {
        endpoint: String,
        action: String,
        message: String,
    },

    /// The persistent token storage could not be read or written.
    #[error("storage failed: {0}")]
    Storage(String),

    /// A login response or persisted entry did not contain a usable token.
    #[error("token decode failed: {0}")]
    TokenDecode(String),
}

impl ApiError {
    /// True for failures that happened on the wire rather than in local code.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ApiError::NotFound | ApiError::HttpError { .. } | ApiError::Transport(_)
        )
    }
}
