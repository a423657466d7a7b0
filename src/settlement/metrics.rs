use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

/// Metrics for the [`SettlementExecutor`](crate::settlement::SettlementExecutor).
#[derive(Clone, Metrics)]
#[metrics(scope = "settlement")]
pub struct SettlementMetrics {
    /// Number of batches started.
    pub batches: Counter,
    /// Number of submitted transactions.
    pub sent: Counter,
    /// Number of confirmed transactions.
    pub confirmed: Counter,
    /// Number of transactions that failed after exhausting their attempts.
    pub failed: Counter,
    /// Number of retried attempts.
    pub retries: Counter,
    /// Number of transactions found confirmed on a recheck before being rebuilt.
    pub late_confirmations: Counter,
    /// Time from submission to confirmation, in milliseconds.
    pub confirmation_time: Histogram,
}
