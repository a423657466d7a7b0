use thiserror::Error;

/// Errors related to building or filtering the participant ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A secret key could not be decoded.
    #[error("invalid secret key at index {index}")]
    InvalidSecretKey {
        /// Position of the offending record in the input.
        index: usize,
    },
    /// No account holds more than the minimum reserve.
    #[error("no wallets need to be collected")]
    NoAccountsEligible,
    /// Merging duplicate amounts overflowed.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}
