use thiserror::Error;

/// Errors surfaced by the VK provider client.
///
/// Rate-limit responses are retried inside the client and never escape;
/// everything here is what callers actually see.
#[derive(Debug, Error)]
pub enum VkApiError {
    /// Server-side failure that persisted past the bounded retry budget.
    #[error("server error from {method}: {message}")]
    InternalServer { method: String, message: String },

    /// The requested user id or screen name does not exist.
    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    /// Any other API-level error, propagated immediately.
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },

    /// The response body did not match the expected shape.
    #[error("failed to parse response from {method}")]
    ParseFailed {
        method: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("transport error")]
    Transport(#[from] reqwest::Error),
}
