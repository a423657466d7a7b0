//! Batched settlement engine.
//!
//! Moves lamports between a single account and many participant accounts as retried, confirmed
//! transactions and reports an outcome per participant.

mod executor;
pub(crate) use executor::CANCELLED;
pub use executor::{ExecutionFailure, SettlementExecutor, SettlementMode};

mod metrics;
pub use metrics::SettlementMetrics;

mod progress;
pub use progress::{
    OperationHandle, ProgressEvent, ProgressSender, ProgressStream, progress_channel,
};

mod retry;
pub use retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use solana_sdk::{pubkey::Pubkey, signature::Signature};

/// Outcome for a single participant.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    /// The participant.
    #[serde_as(as = "DisplayFromStr")]
    pub address: Pubkey,
    /// Whether the transfer confirmed.
    pub success: bool,
    /// Signature of the last submitted transaction, if any was submitted.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    /// Last error message for failed transfers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Lamports moved, or that should have been moved.
    pub amount: u64,
}

impl SettlementResult {
    /// A confirmed transfer.
    pub fn confirmed(address: Pubkey, amount: u64, signature: Signature) -> Self {
        Self { address, success: true, signature: Some(signature), error: None, amount }
    }

    /// A failed transfer.
    pub fn failed(
        address: Pubkey,
        amount: u64,
        error: impl ToString,
        signature: Option<Signature>,
    ) -> Self {
        Self { address, success: false, signature, error: Some(error.to_string()), amount }
    }
}

/// Aggregated outcome of a distribute or collect operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    /// Confirmed transfers.
    pub successful: Vec<SettlementResult>,
    /// Failed transfers.
    pub failed: Vec<SettlementResult>,
}

impl OperationReport {
    /// Files a result under `successful` or `failed`.
    pub fn push(&mut self, result: SettlementResult) {
        if result.success {
            self.successful.push(result);
        } else {
            self.failed.push(result);
        }
    }

    /// Number of accounts covered by the report.
    pub fn len(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    /// Whether the report covers no account.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total lamports moved by confirmed transfers.
    pub fn settled_amount(&self) -> u64 {
        self.successful.iter().fold(0u64, |acc, result| acc.saturating_add(result.amount))
    }
}

impl Extend<SettlementResult> for OperationReport {
    fn extend<T: IntoIterator<Item = SettlementResult>>(&mut self, iter: T) {
        for result in iter {
            self.push(result);
        }
    }
}
