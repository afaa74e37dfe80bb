//! Errors raised while talking to a review platform.
//!
//! `PlatformError` is what every adapter returns. Request failures land in
//! `ProviderError`, keyed by the HTTP status the platform answered with.

use thiserror::Error;

pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// A GitHub or Azure DevOps call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Platform env variables are missing or malformed.
    #[error(transparent)]
    Config(#[from] reconcile::Error),

    /// The plan action cannot be expressed on this platform.
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// 401/403: the token is missing a scope or was revoked.
    #[error("credentials rejected (status {0})")]
    Unauthorized(u16),

    /// 429, with the `Retry-After` seconds when the platform sent them.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success status.
    #[error("request failed with status {0}")]
    Status(u16),

    /// No response: DNS, connect, TLS or timeout.
    #[error("transport: {0}")]
    Transport(String),

    #[error("cannot decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// GraphQL answered 200 with an `errors` array.
    #[error("graphql: {0}")]
    GraphQl(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn from_status(code: u16) -> Self {
        match code {
            401 | 403 => Self::Unauthorized(code),
            429 => Self::RateLimited {
                retry_after_secs: None,
            },
            _ => Self::Status(code),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::from_status(status.as_u16()),
            None if e.is_decode() => Self::InvalidResponse(e.to_string()),
            None => Self::Transport(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        Self::Provider(e.into())
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(e: serde_json::Error) -> Self {
        Self::Provider(e.into())
    }
}
