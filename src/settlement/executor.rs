use super::{OperationReport, ProgressEvent, ProgressSender, SettlementMetrics, SettlementResult};
use crate::{
    config::SettlementConfig,
    error::{TransportError, TransportErrorKind},
    instructions::{build_transaction, transfers},
    planner::Batch,
    transport::{Anchor, DynLedgerClient, SignatureStatus},
};
use futures_util::future::join_all;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::{fmt, sync::Arc};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Message recorded for entries that never started because the operation was cancelled.
pub(crate) const CANCELLED: &str = "operation cancelled";

/// A transaction that could not be confirmed within the allowed attempts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    /// The last error.
    pub error: TransportError,
    /// Signature of the last submitted transaction, if any.
    pub signature: Option<Signature>,
    /// Attempts made.
    pub attempts: u32,
}

/// Direction of a settlement.
#[derive(Clone)]
pub enum SettlementMode {
    /// Pay every entry its requested amount from `payer`, several transfers per transaction.
    Distribute {
        /// The funding account. Pays the fees.
        payer: Arc<Keypair>,
    },
    /// Move every entry's requested amount to `destination`, one transaction per entry signed and
    /// paid by the entry itself.
    Collect {
        /// The receiving account.
        destination: Pubkey,
    },
}

impl fmt::Debug for SettlementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distribute { payer } => {
                f.debug_struct("Distribute").field("payer", &payer.pubkey()).finish()
            }
            Self::Collect { destination } => {
                f.debug_struct("Collect").field("destination", destination).finish()
            }
        }
    }
}

/// Last submitted transaction, kept to detect late confirmations before rebuilding.
#[derive(Debug, Clone, Copy)]
struct Submitted {
    signature: Signature,
    anchor: Anchor,
}

/// Builds, signs, submits and confirms settlement transactions.
#[derive(Clone)]
pub struct SettlementExecutor {
    client: DynLedgerClient,
    config: SettlementConfig,
    metrics: SettlementMetrics,
}

impl fmt::Debug for SettlementExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementExecutor")
            .field("client", &self.client)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SettlementExecutor {
    /// Creates a new executor.
    pub fn new(client: DynLedgerClient, config: SettlementConfig) -> Self {
        Self { client, config, metrics: SettlementMetrics::default() }
    }

    /// The ledger client.
    pub fn client(&self) -> &DynLedgerClient {
        &self.client
    }

    /// The settlement configuration.
    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Runs `batches` in order and collects a result for every entry.
    ///
    /// Batches never overlap. Once `cancel` fires no further batch is started and the entries of
    /// all remaining batches are recorded as failed. Skipped batches still emit a progress event,
    /// so the last event always accounts for every entry.
    pub async fn run(
        &self,
        mode: &SettlementMode,
        batches: Vec<Batch>,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> OperationReport {
        let total: usize = batches.iter().map(Batch::len).sum();
        let batch_count = batches.len();
        let mut report = OperationReport::default();
        let mut completed = 0;

        for batch in batches {
            if cancel.is_cancelled() {
                warn!(
                    batch = batch.index,
                    size = batch.len(),
                    "Operation cancelled, skipping batch"
                );
                report.extend(cancelled_results(&batch));
                completed += batch.len();
                let detail =
                    format!("batch {}/{}: skipped, cancelled", batch.index + 1, batch_count);
                progress.send(ProgressEvent { completed, total, detail }).await;
                continue;
            }

            let results = self.settle_batch(mode, &batch).await;
            let confirmed = results.iter().filter(|result| result.success).count();
            completed += results.len();
            report.extend(results);

            let detail = format!(
                "batch {}/{}: {confirmed}/{} confirmed",
                batch.index + 1,
                batch_count,
                batch.len()
            );
            info!(
                batch = batch.index,
                confirmed,
                size = batch.len(),
                completed,
                total,
                "Batch settled"
            );
            progress.send(ProgressEvent { completed, total, detail }).await;

            if batch.index + 1 < batch_count {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = sleep(self.config.inter_batch_delay) => {}
                }
            }
        }

        report
    }

    /// Settles a single batch and returns one result per entry.
    pub async fn settle_batch(
        &self,
        mode: &SettlementMode,
        batch: &Batch,
    ) -> Vec<SettlementResult> {
        self.metrics.batches.increment(1);
        debug!(batch = batch.index, size = batch.len(), ?mode, "Settling batch");

        match mode {
            SettlementMode::Distribute { payer } => self.distribute_batch(payer, batch).await,
            SettlementMode::Collect { destination } => self.collect_batch(destination, batch).await,
        }
    }

    /// One multi-transfer transaction paid and signed by `payer`.
    async fn distribute_batch(&self, payer: &Keypair, batch: &Batch) -> Vec<SettlementResult> {
        let payer_address = payer.pubkey();
        let instructions = transfers(
            &payer_address,
            batch.entries.iter().map(|entry| (entry.address, entry.requested_amount)),
        );
        let label = format!("distribution batch {}", batch.index);

        let outcome = self
            .execute(&label, |blockhash| {
                build_transaction(&instructions, &payer_address, &[payer], blockhash)
            })
            .await;

        batch
            .entries
            .iter()
            .map(|entry| match &outcome {
                Ok(signature) => {
                    SettlementResult::confirmed(entry.address, entry.requested_amount, *signature)
                }
                Err(failure) => SettlementResult::failed(
                    entry.address,
                    entry.requested_amount,
                    &failure.error,
                    failure.signature,
                ),
            })
            .collect()
    }

    /// One transaction per entry, all entries of the batch in parallel.
    async fn collect_batch(&self, destination: &Pubkey, batch: &Batch) -> Vec<SettlementResult> {
        join_all(batch.entries.iter().map(|entry| async move {
            let source = entry.address;
            let instructions = transfers(&source, [(*destination, entry.requested_amount)]);
            let label = format!("collection from {source}");

            match self
                .execute(&label, |blockhash| {
                    build_transaction(&instructions, &source, &[&entry.keypair], blockhash)
                })
                .await
            {
                Ok(signature) => {
                    SettlementResult::confirmed(source, entry.requested_amount, signature)
                }
                Err(failure) => SettlementResult::failed(
                    source,
                    entry.requested_amount,
                    &failure.error,
                    failure.signature,
                ),
            }
        }))
        .await
    }

    /// Drives one transaction to confirmation, rebuilding it on a fresh blockhash for every
    /// attempt.
    ///
    /// Before rebuilding, the previously submitted signature is checked once more so a transaction
    /// that landed late is never sent twice.
    pub async fn execute<F>(&self, label: &str, build: F) -> Result<Signature, ExecutionFailure>
    where
        F: Fn(Hash) -> Result<VersionedTransaction, TransportError> + Send + Sync,
    {
        let retry = &self.config.retry;
        let mut last: Option<Submitted> = None;
        let mut attempt = 0;

        loop {
            let result = match last {
                Some(submitted) => match self.recheck(label, submitted).await {
                    Some(result) => result,
                    None => self.attempt(label, attempt, &build, &mut last).await,
                },
                None => self.attempt(label, attempt, &build, &mut last).await,
            };

            let err = match result {
                Ok(signature) => {
                    self.metrics.confirmed.increment(1);
                    info!(label, %signature, attempts = attempt + 1, "Transaction confirmed");
                    return Ok(signature);
                }
                Err(err) => err,
            };

            let Some(delay) = retry.delay_for(err.kind, attempt) else {
                self.metrics.failed.increment(1);
                error!(label, %err, attempts = attempt + 1, "Transaction failed");
                return Err(ExecutionFailure {
                    error: err,
                    signature: last.map(|submitted| submitted.signature),
                    attempts: attempt + 1,
                });
            };

            self.metrics.retries.increment(1);
            warn!(label, %err, attempt, ?delay, "Transaction attempt failed, retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Re-checks the last submitted signature.
    ///
    /// Returns `Some` if the signature settled one way or another, `None` if the transaction should
    /// be rebuilt.
    async fn recheck(
        &self,
        label: &str,
        submitted: Submitted,
    ) -> Option<Result<Signature, TransportError>> {
        match self.client.get_signature_status(&submitted.signature).await {
            Ok(SignatureStatus::Confirmed) => {
                self.metrics.late_confirmations.increment(1);
                info!(label, signature = %submitted.signature, "Previous attempt landed late");
                Some(Ok(submitted.signature))
            }
            Ok(SignatureStatus::Processed) => {
                debug!(
                    label,
                    signature = %submitted.signature,
                    "Previous attempt seen, confirming"
                );
                Some(self.confirm(submitted).await.map(|_| submitted.signature))
            }
            Ok(SignatureStatus::Unknown | SignatureStatus::Failed(_)) => None,
            Err(err) => {
                trace!(label, %err, "Failed to recheck previous signature");
                None
            }
        }
    }

    /// A single build, sign, submit and confirm cycle.
    async fn attempt<F>(
        &self,
        label: &str,
        attempt: u32,
        build: &F,
        last: &mut Option<Submitted>,
    ) -> Result<Signature, TransportError>
    where
        F: Fn(Hash) -> Result<VersionedTransaction, TransportError> + Send + Sync,
    {
        let anchor = self.client.get_latest_anchor().await?;
        debug!(label, attempt, blockhash = %anchor.blockhash, "Building transaction");

        let tx = build(anchor.blockhash)?;
        trace!(label, attempt, "Signed transaction");

        let signature = self.client.submit_transaction(&tx, self.config.submit).await?;
        self.metrics.sent.increment(1);
        let submitted = Submitted { signature, anchor };
        *last = Some(submitted);
        debug!(label, attempt, %signature, "Submitted transaction");

        self.confirm(submitted).await?;
        Ok(signature)
    }

    /// Polls the status of a submitted transaction until it confirms, fails, expires or the
    /// confirmation timeout elapses.
    async fn confirm(&self, submitted: Submitted) -> Result<(), TransportError> {
        let Submitted { signature, anchor } = submitted;
        let started = Instant::now();
        let deadline = started + self.config.confirmation_timeout;

        loop {
            match self.client.get_signature_status(&signature).await {
                Ok(SignatureStatus::Confirmed) => {
                    self.metrics.confirmation_time.record(started.elapsed().as_millis() as f64);
                    return Ok(());
                }
                Ok(SignatureStatus::Failed(reason)) => {
                    return Err(TransportError::rejected(reason));
                }
                Ok(SignatureStatus::Unknown) => {
                    if let Ok(height) = self.client.get_block_height().await {
                        if height > anchor.last_valid_block_height {
                            return Err(TransportError::anchor_expired(format!(
                                "block height {height} exceeded {}",
                                anchor.last_valid_block_height
                            )));
                        }
                    }
                }
                Ok(SignatureStatus::Processed) => {}
                Err(err) if err.kind == TransportErrorKind::Rejected => return Err(err),
                Err(err) => trace!(%signature, %err, "Status poll failed"),
            }

            if Instant::now() >= deadline {
                return Err(TransportError::confirmation_timeout(format!(
                    "{signature} not confirmed within {:?}",
                    self.config.confirmation_timeout
                )));
            }

            sleep(self.config.poll_interval).await;
        }
    }
}

fn cancelled_results(batch: &Batch) -> impl Iterator<Item = SettlementResult> + '_ {
    batch.entries.iter().map(|entry| {
        SettlementResult::failed(entry.address, entry.requested_amount, CANCELLED, None)
    })
}
