use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of ledger client failures.
///
/// Produced by the transport adapter so that the settlement engine never has to inspect error
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The recent blockhash used by the transaction is no longer valid.
    AnchorExpired,
    /// The endpoint is throttling us.
    RateLimited,
    /// The transaction was not confirmed before the deadline.
    ConfirmationTimeout,
    /// I/O failure, 5xx, or anything else that is worth retrying.
    TransientNetwork,
    /// The ledger rejected the transaction.
    Rejected,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// Whether an operation failing with this kind should be attempted again.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AnchorExpired
                | Self::RateLimited
                | Self::ConfirmationTimeout
                | Self::TransientNetwork
        )
    }

    /// Label used in logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AnchorExpired => "anchor_expired",
            Self::RateLimited => "rate_limited",
            Self::ConfirmationTimeout => "confirmation_timeout",
            Self::TransientNetwork => "transient_network",
            Self::Rejected => "rejected",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned by the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// What went wrong.
    pub kind: TransportErrorKind,
    /// Human readable details.
    pub message: String,
}

impl TransportError {
    /// Creates a new error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Shortcut for [`TransportErrorKind::AnchorExpired`].
    pub fn anchor_expired(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::AnchorExpired, message)
    }

    /// Shortcut for [`TransportErrorKind::RateLimited`].
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::RateLimited, message)
    }

    /// Shortcut for [`TransportErrorKind::ConfirmationTimeout`].
    pub fn confirmation_timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConfirmationTimeout, message)
    }

    /// Shortcut for [`TransportErrorKind::TransientNetwork`].
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::TransientNetwork, message)
    }

    /// Shortcut for [`TransportErrorKind::Rejected`].
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Rejected, message)
    }

    /// Shortcut for [`TransportErrorKind::Other`].
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// Whether the failed operation should be attempted again.
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
