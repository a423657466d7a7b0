//! Drives complete distribute and collect operations.
use crate::{
    config::SettlementConfig,
    constants::PROGRESS_CHANNEL_CAPACITY,
    error::{LedgerError, OperationError},
    ledger::AccountLedger,
    planner,
    settlement::{
        OperationHandle, OperationReport, ProgressSender, SettlementExecutor, SettlementMode,
        CANCELLED, SettlementResult, progress_channel,
    },
    transport::DynLedgerClient,
};
use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use std::{collections::HashMap, sync::Arc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Composes ledger, planner and executor into full operations.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    executor: SettlementExecutor,
}

impl Orchestrator {
    /// Creates a new orchestrator.
    pub fn new(client: DynLedgerClient, config: SettlementConfig) -> Self {
        Self { executor: SettlementExecutor::new(client, config) }
    }

    /// The underlying executor.
    pub fn executor(&self) -> &SettlementExecutor {
        &self.executor
    }

    /// Pays every ledger entry its requested amount from `payer`.
    pub async fn distribute(
        &self,
        payer: Arc<Keypair>,
        ledger: AccountLedger,
    ) -> Result<OperationReport, OperationError> {
        self.run_distribute(payer, ledger, ProgressSender::noop(), CancellationToken::new()).await
    }

    /// Sweeps everything above `min_reserve` from every ledger entry into `destination`.
    pub async fn collect(
        &self,
        destination: Pubkey,
        ledger: AccountLedger,
        min_reserve: u64,
    ) -> Result<OperationReport, OperationError> {
        self.run_collect(
            destination,
            ledger,
            min_reserve,
            ProgressSender::noop(),
            CancellationToken::new(),
        )
        .await
    }

    /// Spawns [`Self::distribute`] and returns a handle to observe or cancel it.
    pub fn spawn_distribute(&self, payer: Arc<Keypair>, ledger: AccountLedger) -> OperationHandle {
        let (progress, stream) = progress_channel(PROGRESS_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let task =
            tokio::spawn(async move { this.run_distribute(payer, ledger, progress, token).await });
        OperationHandle::new(stream, cancel, task)
    }

    /// Spawns [`Self::collect`] and returns a handle to observe or cancel it.
    pub fn spawn_collect(
        &self,
        destination: Pubkey,
        ledger: AccountLedger,
        min_reserve: u64,
    ) -> OperationHandle {
        let (progress, stream) = progress_channel(PROGRESS_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            this.run_collect(destination, ledger, min_reserve, progress, token).await
        });
        OperationHandle::new(stream, cancel, task)
    }

    async fn run_distribute(
        &self,
        payer: Arc<Keypair>,
        ledger: AccountLedger,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<OperationReport, OperationError> {
        let total = ledger.total_requested().ok_or(LedgerError::ArithmeticOverflow)?;
        let config = self.executor.config();
        let batches = planner::plan(ledger.into_entries(), config.batch_size);
        info!(batches = batches.len(), total_lamports = total, "Starting distribution");

        let report = self
            .executor
            .run(&SettlementMode::Distribute { payer }, batches, &progress, &cancel)
            .await;

        info!(
            successful = report.successful.len(),
            failed = report.failed.len(),
            "Distribution finished"
        );
        Ok(report)
    }

    async fn run_collect(
        &self,
        destination: Pubkey,
        ledger: AccountLedger,
        min_reserve: u64,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<OperationReport, OperationError> {
        let (balances, unavailable) = self.fetch_balances(&ledger, &cancel).await;

        let eligible = match ledger.filter_above_threshold(&balances, min_reserve) {
            Ok(eligible) => eligible,
            // lookup failures take precedence over NoAccountsEligible
            Err(LedgerError::NoAccountsEligible) if !unavailable.is_empty() => {
                let mut report = OperationReport::default();
                report.extend(unavailable);
                return Ok(report);
            }
            Err(err) => return Err(err.into()),
        };

        let config = self.executor.config();
        let batches = planner::plan(eligible.into_entries(), config.concurrency);
        info!(
            %destination,
            batches = batches.len(),
            unavailable = unavailable.len(),
            "Starting collection"
        );

        let mut report = OperationReport::default();
        report.extend(unavailable);
        let settled = self
            .executor
            .run(&SettlementMode::Collect { destination }, batches, &progress, &cancel)
            .await;
        report.extend(settled.successful.into_iter().chain(settled.failed));

        info!(
            successful = report.successful.len(),
            failed = report.failed.len(),
            collected = report.settled_amount(),
            "Collection finished"
        );
        Ok(report)
    }

    /// Looks up every balance one by one, pausing between requests.
    ///
    /// Returns the known balances and a failed result for every account that could not be looked
    /// up.
    async fn fetch_balances(
        &self,
        ledger: &AccountLedger,
        cancel: &CancellationToken,
    ) -> (HashMap<Pubkey, u64>, Vec<SettlementResult>) {
        let config = self.executor.config();
        let client = self.executor.client().as_ref();
        let mut balances = HashMap::with_capacity(ledger.len());
        let mut unavailable = Vec::new();

        for (index, address) in ledger.addresses().enumerate() {
            if cancel.is_cancelled() {
                unavailable.push(SettlementResult::failed(address, 0, CANCELLED, None));
                continue;
            }
            if index > 0 {
                sleep(config.balance_fetch_delay).await;
            }

            let lookup = &address;
            match config.retry.retry("balance lookup", move || client.get_balance(lookup)).await {
                Ok(balance) => {
                    balances.insert(address, balance);
                }
                Err(err) => {
                    warn!(%address, %err, "Failed to fetch balance");
                    unavailable.push(SettlementResult::failed(address, 0, err, None));
                }
            }
        }

        (balances, unavailable)
    }
}
