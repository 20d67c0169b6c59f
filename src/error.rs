//! Error types for the REST client core.
//!
//! This module provides [`Error`], the single error type returned by every
//! fallible operation in the crate. Errors are grouped by the stage that
//! produces them: request construction, transport execution, and response
//! decoding.

use std::time::Duration;

/// Errors produced by the REST client pipeline.
///
/// Build-stage variants (`InvalidUrl`, `Encode`, `ParamParse`) are recorded
/// as the sticky error on a [`Request`](crate::Request) and short-circuit
/// the eventual call. Transport-stage variants surface from
/// [`Request::send`](crate::Request::send). Decode-stage variants
/// (`NoCodec`, `EmptyBody`, `Decode`) surface only from
/// [`CallResult::decode_into`](crate::CallResult::decode_into).
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// A URL could not be parsed or assembled.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A request body or parameter object could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A query-string value could not be converted to the target field kind.
    #[error("cannot parse {value:?} as {expected} for query key {key:?}")]
    ParamParse {
        /// Name of the expected Rust type, e.g. `"u8"`.
        expected: &'static str,
        /// The raw query-string value that failed to convert.
        value: String,
        /// The query key the value was read from.
        key: String,
    },

    /// Network-level failure from the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// The per-request timeout elapsed before a response arrived.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be read to completion.
    ///
    /// The response headers arrived but the body stream was not consumable;
    /// the request itself may succeed on retry.
    #[error("error reading response body, retry may succeed: {0}")]
    BodyRead(String),

    /// No decoder is configured for the response content type.
    #[error("no codec for content type {content_type:?}")]
    NoCodec {
        /// The content type the response carried.
        content_type: String,
    },

    /// The response body was empty where a decodable payload was expected.
    #[error("0-length response with status code {status} and content type {content_type:?}")]
    EmptyBody {
        /// HTTP status code of the response.
        status: u16,
        /// The content type the response carried.
        content_type: String,
    },

    /// The response body could not be decoded into the target type.
    #[error("decode error: {0}")]
    Decode(String),

    /// Credential injection or provider login failed.
    #[error("auth error: {0}")]
    Auth(String),
}

impl Error {
    /// Returns whether this error indicates a transient condition that may
    /// be resolved by retrying the request.
    ///
    /// Build and decode failures are deterministic and never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Timeout(_) | Error::BodyRead(_)
        )
    }
}
