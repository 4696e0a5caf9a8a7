// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types shared by every stage of the client pipeline.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Broad classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The connection could not be established
    Connect,
    /// The request could not be written
    Request,
    /// The response body could not be read
    Body,
    /// Redirect handling failed
    Redirect,
    /// Anything reqwest does not classify further
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::Request => write!(f, "request"),
            TransportErrorKind::Body => write!(f, "body"),
            TransportErrorKind::Redirect => write!(f, "redirect"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Errors that can occur while executing a call.
///
/// The type is `Clone` because a single failure is both handed to the retry
/// policy and, once the policy declines, returned to the caller.
#[derive(Error, Debug, Clone)]
pub enum FeignError {
    /// The transport failed before a response was produced
    #[error("transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// Timeout error
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A status handler converted the response into an error
    #[error("status {status} reading {method_key}: {reason}")]
    Status {
        method_key: String,
        status: u16,
        reason: String,
        body: Option<Bytes>,
        retry_after: Option<Duration>,
    },

    /// A successful body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// The request could not be constructed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl FeignError {
    /// Create a transport error of the given kind.
    pub fn transport<M: fmt::Display>(kind: TransportErrorKind, message: M) -> Self {
        Self::Transport {
            kind,
            message: message.to_string(),
        }
    }

    /// The HTTP status carried by a status error.
    pub fn status(&self) -> Option<u16> {
        match self {
            FeignError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server-requested delay carried by a status error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FeignError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether the default retry filter treats this error as transient.
    ///
    /// Transport failures and timeouts are transient, as are status errors
    /// for `429` and any `5xx`. Decode and configuration errors never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeignError::Transport { .. } | FeignError::Timeout(_) => true,
            FeignError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FeignError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_redirect() {
            TransportErrorKind::Redirect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        FeignError::transport(kind, err)
    }
}

impl From<crate::config::ConfigError> for FeignError {
    fn from(err: crate::config::ConfigError) -> Self {
        FeignError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for FeignError {
    fn from(err: serde_json::Error) -> Self {
        FeignError::Decode(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderName> for FeignError {
    fn from(err: reqwest::header::InvalidHeaderName) -> Self {
        FeignError::InvalidRequest(format!("invalid header name: {err}"))
    }
}

impl From<reqwest::header::InvalidHeaderValue> for FeignError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        FeignError::InvalidRequest(format!("invalid header value: {err}"))
    }
}
