//! Error types.
use crate::{curve::CurveError, settlement::ExecutionFailure};
use thiserror::Error;

mod ledger;
pub use ledger::LedgerError;

mod relay;
pub use relay::RelayError;

mod transport;
pub use transport::{TransportError, TransportErrorKind};

/// Hard failures that prevent an operation from starting or a trade from being built.
///
/// Failures of individual batches never surface here, they are recorded in the operation report.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Errors related to the participant ledger.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// Errors related to curve pricing.
    #[error(transparent)]
    Curve(#[from] CurveError),
    /// An error occurred talking to the ledger client.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A transaction could not be confirmed within the allowed attempts.
    #[error("transaction failed after {} attempts: {}", .0.attempts, .0.error)]
    Execution(#[from] ExecutionFailure),
    /// An error occurred talking to the bundle relay or the trade builder.
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// The operation task panicked or was aborted.
    #[error("operation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// An internal error occurred.
    #[error(transparent)]
    Internal(#[from] eyre::Error),
}
