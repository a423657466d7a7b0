use crate::e2e::{MockLedger, client, participants, settlement_config};
use relay::{
    error::{LedgerError, OperationError, TransportError},
    orchestrator::Orchestrator,
};
use solana_sdk::pubkey::Pubkey;

#[tokio::test(start_paused = true)]
async fn collect_sweeps_everything_above_reserve() -> eyre::Result<()> {
    let ledger = MockLedger::new();
    let (addresses, accounts) = participants(3, 0);
    ledger.set_balance(addresses[0], 1_000_000);
    ledger.set_balance(addresses[1], 5_000);
    ledger.set_balance(addresses[2], 10_000);
    let destination = Pubkey::new_unique();

    let report = Orchestrator::new(client(&ledger), settlement_config())
        .collect(destination, accounts, 5_000)
        .await?;

    let collected: Vec<_> =
        report.successful.iter().map(|result| (result.address, result.amount)).collect();
    assert_eq!(collected, vec![(addresses[0], 995_000), (addresses[2], 5_000)]);
    assert!(report.failed.is_empty());
    assert_eq!(report.settled_amount(), 1_000_000);

    // every source pays for and signs its own sweep
    for (tx, source) in ledger.submitted().iter().zip([addresses[0], addresses[2]]) {
        let keys = tx.message.static_account_keys();
        assert_eq!(keys[0], source);
        assert!(keys.contains(&destination));
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn collect_runs_in_concurrency_sized_batches() -> eyre::Result<()> {
    let ledger = MockLedger::new();
    let (addresses, accounts) = participants(7, 0);
    for address in &addresses {
        ledger.set_balance(*address, 20_000);
    }

    let report = Orchestrator::new(client(&ledger), settlement_config())
        .collect(Pubkey::new_unique(), accounts, 5_000)
        .await?;

    assert_eq!(report.successful.len(), 7);
    assert_eq!(ledger.submit_calls(), 7);
    assert_eq!(report.settled_amount(), 7 * 15_000);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn nothing_to_collect_fails_before_building_transactions() {
    let ledger = MockLedger::new();
    let (addresses, accounts) = participants(3, 0);
    ledger.set_balance(addresses[0], 5_000);
    ledger.set_balance(addresses[1], 1_000);

    let err = Orchestrator::new(client(&ledger), settlement_config())
        .collect(Pubkey::new_unique(), accounts, 5_000)
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Ledger(LedgerError::NoAccountsEligible)));
    assert_eq!(ledger.submit_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_balance_lookup_is_reported() -> eyre::Result<()> {
    let ledger = MockLedger::new();
    let (addresses, accounts) = participants(2, 0);
    ledger.fail_balance(addresses[0], TransportError::rejected("account index out of range"));
    ledger.set_balance(addresses[1], 50_000);

    let report = Orchestrator::new(client(&ledger), settlement_config())
        .collect(Pubkey::new_unique(), accounts, 5_000)
        .await?;

    assert_eq!(report.successful.len(), 1);
    assert_eq!(report.successful[0].address, addresses[1]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].address, addresses[0]);
    assert!(report.failed[0].error.as_deref().is_some_and(|err| err.starts_with("rejected")));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn only_failed_lookups_still_produce_a_report() -> eyre::Result<()> {
    let ledger = MockLedger::new();
    let (addresses, accounts) = participants(1, 0);
    ledger.fail_balance(addresses[0], TransportError::transient("connection reset"));

    let report = Orchestrator::new(client(&ledger), settlement_config())
        .collect(Pubkey::new_unique(), accounts, 5_000)
        .await?;

    assert!(report.successful.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(ledger.submit_calls(), 0);

    Ok(())
}
