use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the bundle relay and the trade builder.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The request could not be sent.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: StatusCode,
        /// Response body, as far as it could be read.
        body: String,
    },
    /// The response was not what we expected.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The relay returned a JSON-RPC error envelope.
    #[error("relay error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// Bundles must contain between one and [`MAX_BUNDLE_SIZE`](crate::constants::MAX_BUNDLE_SIZE)
    /// transactions.
    #[error("invalid bundle size {0}, expected between 1 and 5 transactions")]
    InvalidBundleSize(usize),
    /// A transaction returned by the trade builder could not be decoded or signed.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
}
