use crate::e2e::{
    FailingEndpoint, FakeBuilder, FakeRelay, MockLedger, client, curve_account, global_account,
    global_parameters, settlement_config,
};
use relay::{
    bundle::BundleSubmitter,
    config::BundleConfig,
    constants::{ASSOCIATED_TOKEN_PROGRAM_ID, PUMP_PROGRAM_ID, TOKEN_PROGRAM_ID},
    curve::{self, CurveState, pda},
    error::{OperationError, RelayError},
    settlement::SettlementExecutor,
    trade::Trader,
    trade_builder::{TokenMetadata, TradeBuilderClient, decode_transaction},
};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use url::Url;

/// Nothing listens here.
const UNREACHABLE: &str = "http://127.0.0.1:9";

fn trader(ledger: &Arc<MockLedger>) -> Trader {
    let unreachable = Url::parse(UNREACHABLE).unwrap();
    bundle_trader(ledger, &unreachable, &unreachable)
}

fn bundle_trader(ledger: &Arc<MockLedger>, builder: &Url, relay: &Url) -> Trader {
    Trader::new(
        SettlementExecutor::new(client(ledger), settlement_config()),
        TradeBuilderClient::new(builder.clone()),
        BundleSubmitter::new(relay.clone()),
        BundleConfig::default(),
    )
}

fn metadata() -> TokenMetadata {
    TokenMetadata { name: "Name".into(), symbol: "SYM".into(), uri: "ipfs://meta".into() }
}

fn live_curve() -> CurveState {
    CurveState {
        virtual_token_reserves: 1_000_000_000_000_000,
        virtual_sol_reserves: 32_000_000_000,
        real_token_reserves: 720_000_000_000_000,
        real_sol_reserves: 2_000_000_000,
        token_total_supply: 1_000_000_000_000_000,
        complete: false,
    }
}

fn token_account(amount: u64) -> Vec<u8> {
    let mut data = vec![0u8; 165];
    data[64..72].copy_from_slice(&amount.to_le_bytes());
    data
}

/// A ledger with the global account and a live curve for a fresh mint.
fn market() -> (Arc<MockLedger>, Pubkey) {
    let ledger = MockLedger::new();
    let mint = Pubkey::new_unique();
    ledger.set_account(pda::global_address(), global_account(&global_parameters()));
    ledger.set_account(pda::bonding_curve_address(&mint), curve_account(&live_curve()));
    (ledger, mint)
}

#[tokio::test(start_paused = true)]
async fn quotes_use_the_onchain_curve() -> eyre::Result<()> {
    let (ledger, mint) = market();
    let trader = trader(&ledger);

    let buy = trader.quote_buy(&mint, 1_000_000_000, 500).await?;
    assert_eq!(buy.amount_out, live_curve().quote_buy(1_000_000_000)?);
    assert_eq!(buy.bound, 1_050_000_000);

    let sell = trader.quote_sell(&mint, buy.amount_out, 500).await?;
    assert_eq!(sell.amount_out, live_curve().quote_sell(buy.amount_out, 100)?);
    assert_eq!(sell.bound, curve::slippage_floor(sell.amount_out, 500)?);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unlaunched_mint_is_quoted_on_initial_reserves() -> eyre::Result<()> {
    let (ledger, _) = market();
    let trader = trader(&ledger);
    let unlaunched = Pubkey::new_unique();

    let quote = trader.quote_buy(&unlaunched, 1_000_000_000, 0).await?;
    assert_eq!(quote.amount_out, global_parameters().initial_buy_price(1_000_000_000)?);

    // nothing to sell into
    let err = trader.quote_sell(&unlaunched, 1_000, 0).await.unwrap_err();
    assert!(matches!(err, OperationError::Curve(_)));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn completed_curve_refuses_quotes() {
    let (ledger, mint) = market();
    let complete = CurveState { complete: true, ..live_curve() };
    ledger.set_account(pda::bonding_curve_address(&mint), curve_account(&complete));

    let err = trader(&ledger).quote_buy(&mint, 1_000, 0).await.unwrap_err();
    assert!(matches!(err, OperationError::Curve(curve::CurveError::CurveCompleted)));
}

#[tokio::test(start_paused = true)]
async fn buy_creates_token_account_then_buys() -> eyre::Result<()> {
    let (ledger, mint) = market();
    let buyer = Keypair::new();

    let outcome = trader(&ledger).buy(&buyer, &mint, 500_000_000, 100).await?;

    let submitted = ledger.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].signatures[0], outcome.signature);
    let message = &submitted[0].message;
    let keys = message.static_account_keys();
    let programs: Vec<_> = message
        .instructions()
        .iter()
        .map(|ix| keys[ix.program_id_index as usize])
        .collect();
    assert_eq!(programs, vec![ASSOCIATED_TOKEN_PROGRAM_ID, PUMP_PROGRAM_ID]);
    assert_eq!(keys[0], buyer.pubkey());
    assert_eq!(outcome.quote.bound, 505_000_000);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sell_all_reads_the_balance_first() -> eyre::Result<()> {
    let (ledger, mint) = market();
    let seller = Keypair::new();
    let trader = trader(&ledger);

    // no token account yet
    assert!(trader.sell_all(&seller, &mint, 100).await?.is_none());
    assert_eq!(ledger.submit_calls(), 0);

    let token_address = pda::associated_token_address(&seller.pubkey(), &mint);
    ledger.set_account(token_address, token_account(42_000_000));
    let outcome = trader.sell_all(&seller, &mint, 100).await?.expect("balance to sell");
    assert_eq!(outcome.amount_in, 42_000_000);

    let keys = ledger.submitted()[0].message.static_account_keys().to_vec();
    assert!(keys.contains(&TOKEN_PROGRAM_ID));

    Ok(())
}

#[tokio::test]
async fn oversized_launch_bundle_is_rejected_up_front() {
    let ledger = MockLedger::new();
    let creator = Keypair::new();
    let mint = Keypair::new();
    let buyers: Vec<_> = (0..5).map(|_| Keypair::new()).collect();
    let buys: Vec<_> = buyers.iter().map(|buyer| (buyer, 0.1)).collect();

    let err = trader(&ledger)
        .create_and_buy_bundle(
            &creator,
            &mint,
            metadata(),
            1.0,
            &buys,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OperationError::Relay(RelayError::InvalidBundleSize(6))));
}

#[tokio::test]
async fn failing_sell_group_does_not_stop_later_groups() {
    let ledger = MockLedger::new();
    let sellers: Vec<_> = (0..7).map(|_| Keypair::new()).collect();
    let refs: Vec<_> = sellers.iter().collect();

    let groups = trader(&ledger).sell_all_bundle(&Pubkey::new_unique(), &refs).await;

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].accounts.len(), 5);
    assert_eq!(groups[1].accounts, vec![sellers[5].pubkey(), sellers[6].pubkey()]);
    assert!(groups.iter().all(|group| group.receipt.is_none() && group.error.is_some()));
}

#[tokio::test]
async fn launch_bundle_is_signed_by_mint_and_creator() -> eyre::Result<()> {
    let builder = FakeBuilder::spawn().await?;
    let relay = FakeRelay::spawn(false).await?;
    let ledger = MockLedger::new();
    let creator = Keypair::new();
    let mint = Keypair::new();
    let buyers: Vec<_> = (0..3).map(|_| Keypair::new()).collect();
    let buys = [(&buyers[0], 0.5), (&buyers[1], 0.0), (&buyers[2], 0.25)];

    let receipt = bundle_trader(&ledger, &builder.url, &relay.url)
        .create_and_buy_bundle(&creator, &mint, metadata(), 1.0, &buys)
        .await?;

    // the zero buy is left out, the rest keep request order
    let trades = builder.received.lock().unwrap().clone();
    assert_eq!(trades.len(), 1);
    let posted: Vec<_> = trades[0]
        .iter()
        .map(|trade| (trade["action"].as_str().unwrap(), trade["publicKey"].as_str().unwrap()))
        .map(|(action, key)| (action.to_string(), key.parse::<Pubkey>().unwrap()))
        .collect();
    assert_eq!(
        posted,
        vec![
            ("create".to_string(), creator.pubkey()),
            ("buy".to_string(), buyers[0].pubkey()),
            ("buy".to_string(), buyers[2].pubkey()),
        ]
    );
    assert_eq!(trades[0][0]["tokenMetadata"]["symbol"], "SYM");

    let bundles = relay.received.lock().unwrap().clone();
    assert_eq!(bundles.len(), 1);
    let sent = bundles[0]
        .iter()
        .map(|encoded| decode_transaction(encoded))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|tx| tx.verify_with_results().iter().all(|ok| *ok)));

    let create = &sent[0];
    assert_eq!(create.signatures.len(), 2);
    assert_eq!(&create.message.static_account_keys()[..2], &[creator.pubkey(), mint.pubkey()]);
    assert_eq!(sent[1].message.static_account_keys()[0], buyers[0].pubkey());
    assert_eq!(sent[2].message.static_account_keys()[0], buyers[2].pubkey());

    assert_eq!(receipt.bundle_id, "bundle-1");
    let signatures: Vec<_> = sent.iter().map(|tx| tx.signatures[0]).collect();
    assert_eq!(receipt.signatures, signatures);

    Ok(())
}

#[tokio::test]
async fn sell_all_bundles_every_group() -> eyre::Result<()> {
    let builder = FakeBuilder::spawn().await?;
    let relay = FakeRelay::spawn(false).await?;
    let ledger = MockLedger::new();
    let sellers: Vec<_> = (0..7).map(|_| Keypair::new()).collect();
    let refs: Vec<_> = sellers.iter().collect();
    let mint = Pubkey::new_unique();

    let groups =
        bundle_trader(&ledger, &builder.url, &relay.url).sell_all_bundle(&mint, &refs).await;

    assert_eq!(groups.len(), 2);
    assert!(groups.iter().all(|group| group.error.is_none()));
    let receipts: Vec<_> = groups.iter().map(|group| group.receipt.clone().unwrap()).collect();
    assert_eq!(receipts[0].bundle_id, "bundle-1");
    assert_eq!(receipts[1].bundle_id, "bundle-2");
    assert_eq!(receipts[0].signatures.len(), 5);
    assert_eq!(receipts[1].signatures.len(), 2);
    assert_eq!(groups[1].accounts, vec![sellers[5].pubkey(), sellers[6].pubkey()]);

    let sizes: Vec<_> = relay.received.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![5, 2]);
    let trades = builder.received.lock().unwrap().clone();
    assert!(trades.iter().flatten().all(|trade| trade["action"] == "sell"
        && trade["amount"] == "100%"
        && trade["mint"] == mint.to_string()));

    Ok(())
}

#[tokio::test]
async fn builder_error_status_fails_the_bundle() -> eyre::Result<()> {
    let builder = FailingEndpoint::spawn(500).await?;
    let relay = FakeRelay::spawn(false).await?;
    let ledger = MockLedger::new();
    let buyer = Keypair::new();

    let err = bundle_trader(&ledger, &builder.url, &relay.url)
        .buy_bundle(&Pubkey::new_unique(), &[(&buyer, 0.1)])
        .await
        .unwrap_err();

    match err {
        OperationError::Relay(RelayError::Status { status, .. }) => {
            assert_eq!(status.as_u16(), 500)
        }
        other => panic!("expected an error status, got {other:?}"),
    }
    assert!(relay.received.lock().unwrap().is_empty());

    Ok(())
}
