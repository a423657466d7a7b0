//! Trade flows against the bonding curve program.
//!
//! Single-account trades are built locally from fresh curve state and go through the
//! [`SettlementExecutor`]. Multi-account trades are built by the trade builder service and land
//! atomically as bundles.

use crate::{
    bundle::{BundleReceipt, BundleSubmitter},
    config::{BundleConfig, SettlerConfig},
    constants::MAX_BUNDLE_SIZE,
    curve::{self, CurveError, CurveState, GlobalParameters, pda},
    error::{OperationError, RelayError},
    instructions,
    settlement::SettlementExecutor,
    trade_builder::{self, TokenMetadata, TradeBuilderClient, TradeRequest},
    transport::DynLedgerClient,
};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use tracing::{error, info};

/// Result of a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeQuote {
    /// Tokens received for a buy, lamports received for a sell.
    pub amount_out: u64,
    /// Maximum lamports paid for a buy, minimum lamports accepted for a sell.
    pub bound: u64,
}

/// A confirmed single-account trade.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOutcome {
    /// Signature of the confirmed transaction.
    #[serde_as(as = "DisplayFromStr")]
    pub signature: Signature,
    /// Amount traded in, tokens for sells and lamports for buys.
    pub amount_in: u64,
    /// The quote the transaction was built from.
    pub quote: TradeQuote,
}

/// Outcome of one bundle of a multi-group flow.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleGroupResult {
    /// Position of the group.
    pub index: usize,
    /// Accounts of the group, in bundle order.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub accounts: Vec<Pubkey>,
    /// Relay receipt if the bundle was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<BundleReceipt>,
    /// Why the group failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Drives quotes and trades.
#[derive(Debug, Clone)]
pub struct Trader {
    executor: SettlementExecutor,
    builder: TradeBuilderClient,
    bundles: BundleSubmitter,
    config: BundleConfig,
}

impl Trader {
    /// Creates a new trader.
    pub fn new(
        executor: SettlementExecutor,
        builder: TradeBuilderClient,
        bundles: BundleSubmitter,
        config: BundleConfig,
    ) -> Self {
        Self { executor, builder, bundles, config }
    }

    /// Creates a trader from the settler configuration.
    pub fn from_config(client: DynLedgerClient, config: &SettlerConfig) -> eyre::Result<Self> {
        Ok(Self::new(
            SettlementExecutor::new(client, config.settlement),
            TradeBuilderClient::new(config.bundle.trade_builder_url()?),
            BundleSubmitter::new(config.bundle.relay_url()?),
            config.bundle.clone(),
        ))
    }

    /// Fetches the global parameters.
    pub async fn global_parameters(&self) -> Result<GlobalParameters, OperationError> {
        let data = self
            .executor
            .client()
            .get_account_data(&pda::global_address())
            .await?
            .ok_or_else(|| CurveError::InvalidAccountData("global account not found".into()))?;
        Ok(GlobalParameters::from_account_data(&data)?)
    }

    /// Fetches the curve of `mint`, `None` if it has not been created yet.
    pub async fn curve(&self, mint: &Pubkey) -> Result<Option<CurveState>, OperationError> {
        let data =
            self.executor.client().get_account_data(&pda::bonding_curve_address(mint)).await?;
        Ok(data.map(|data| CurveState::from_account_data(&data)).transpose()?)
    }

    /// Fetches the curve of `mint`, failing if it does not exist.
    async fn live_curve(&self, mint: &Pubkey) -> Result<CurveState, OperationError> {
        self.curve(mint)
            .await?
            .ok_or_else(|| CurveError::InvalidAccountData(format!("no bonding curve for {mint}")))
            .map_err(Into::into)
    }

    /// Quotes a buy of `sol_in` lamports.
    ///
    /// Mints without a curve are quoted against the initial reserves.
    pub async fn quote_buy(
        &self,
        mint: &Pubkey,
        sol_in: u64,
        slippage_bps: u64,
    ) -> Result<TradeQuote, OperationError> {
        let global = self.global_parameters().await?;
        let curve = self.curve(mint).await?.unwrap_or_else(|| global.initial_curve());
        buy_quote(&curve, sol_in, slippage_bps)
    }

    /// Quotes a sell of `tokens_in` tokens.
    pub async fn quote_sell(
        &self,
        mint: &Pubkey,
        tokens_in: u64,
        slippage_bps: u64,
    ) -> Result<TradeQuote, OperationError> {
        let global = self.global_parameters().await?;
        let curve = self.live_curve(mint).await?;
        sell_quote(&curve, &global, tokens_in, slippage_bps)
    }

    /// Buys with `sol_in` lamports from `buyer`, creating its token account if needed.
    pub async fn buy(
        &self,
        buyer: &Keypair,
        mint: &Pubkey,
        sol_in: u64,
        slippage_bps: u64,
    ) -> Result<TradeOutcome, OperationError> {
        let global = self.global_parameters().await?;
        let curve = self.curve(mint).await?.unwrap_or_else(|| global.initial_curve());
        let quote = buy_quote(&curve, sol_in, slippage_bps)?;

        let user = buyer.pubkey();
        let ixs = [
            instructions::create_associated_token_account_idempotent(&user, &user, mint),
            instructions::buy(&user, mint, &global.fee_recipient, quote.amount_out, quote.bound)?,
        ];
        let label = format!("buy {mint} for {user}");
        let signature = self
            .executor
            .execute(&label, |blockhash| {
                instructions::build_transaction(&ixs, &user, &[buyer], blockhash)
            })
            .await?;

        info!(%user, %mint, sol_in, tokens = quote.amount_out, %signature, "Bought");
        Ok(TradeOutcome { signature, amount_in: sol_in, quote })
    }

    /// Sells `tokens_in` tokens held by `seller`.
    pub async fn sell(
        &self,
        seller: &Keypair,
        mint: &Pubkey,
        tokens_in: u64,
        slippage_bps: u64,
    ) -> Result<TradeOutcome, OperationError> {
        let global = self.global_parameters().await?;
        let curve = self.live_curve(mint).await?;
        let quote = sell_quote(&curve, &global, tokens_in, slippage_bps)?;

        let user = seller.pubkey();
        let ixs =
            [instructions::sell(&user, mint, &global.fee_recipient, tokens_in, quote.bound)?];
        let label = format!("sell {mint} for {user}");
        let signature = self
            .executor
            .execute(&label, |blockhash| {
                instructions::build_transaction(&ixs, &user, &[seller], blockhash)
            })
            .await?;

        info!(%user, %mint, tokens_in, lamports = quote.amount_out, %signature, "Sold");
        Ok(TradeOutcome { signature, amount_in: tokens_in, quote })
    }

    /// Sells the whole balance of `seller`, read right before the sell is built.
    ///
    /// Returns `None` when there is nothing to sell.
    pub async fn sell_all(
        &self,
        seller: &Keypair,
        mint: &Pubkey,
        slippage_bps: u64,
    ) -> Result<Option<TradeOutcome>, OperationError> {
        let token_account = pda::associated_token_address(&seller.pubkey(), mint);
        let balance = self.executor.client().get_token_balance(&token_account).await?;

        match balance {
            Some(tokens) if tokens > 0 => {
                self.sell(seller, mint, tokens, slippage_bps).await.map(Some)
            }
            _ => {
                info!(seller = %seller.pubkey(), %mint, "Nothing to sell");
                Ok(None)
            }
        }
    }

    /// Launches `mint` and buys into it from `creator` and up to four more `buyers` atomically.
    ///
    /// Buyers with a non-positive amount are skipped.
    pub async fn create_and_buy_bundle(
        &self,
        creator: &Keypair,
        mint: &Keypair,
        metadata: TokenMetadata,
        creator_sol: f64,
        buyers: &[(&Keypair, f64)],
    ) -> Result<BundleReceipt, OperationError> {
        let mint_address = mint.pubkey();
        let mut trades: Vec<(Vec<&Keypair>, TradeRequest)> = vec![(
            vec![mint, creator],
            TradeRequest::create(creator.pubkey(), mint_address, metadata, creator_sol),
        )];
        trades.extend(buyers.iter().filter(|(_, sol)| *sol > 0.0).map(|(buyer, sol)| {
            (vec![*buyer], TradeRequest::buy(buyer.pubkey(), mint_address, *sol))
        }));

        let receipt = self.submit_trades(trades).await?;
        info!(mint = %mint_address, bundle_id = %receipt.bundle_id, "Launch bundle accepted");
        Ok(receipt)
    }

    /// Buys `mint` from up to five `buyers` atomically.
    pub async fn buy_bundle(
        &self,
        mint: &Pubkey,
        buyers: &[(&Keypair, f64)],
    ) -> Result<BundleReceipt, OperationError> {
        let trades = buyers
            .iter()
            .filter(|(_, sol)| *sol > 0.0)
            .map(|(buyer, sol)| (vec![*buyer], TradeRequest::buy(buyer.pubkey(), *mint, *sol)))
            .collect();
        self.submit_trades(trades).await
    }

    /// Sells the whole balance of every seller, five sellers per bundle.
    ///
    /// A failing group is recorded and the remaining groups still run.
    pub async fn sell_all_bundle(
        &self,
        mint: &Pubkey,
        sellers: &[&Keypair],
    ) -> Vec<BundleGroupResult> {
        let mut results = Vec::new();

        for (index, group) in sellers.chunks(MAX_BUNDLE_SIZE).enumerate() {
            let accounts: Vec<_> = group.iter().map(|seller| seller.pubkey()).collect();
            let trades = group
                .iter()
                .map(|seller| (vec![*seller], TradeRequest::sell_all(seller.pubkey(), *mint)))
                .collect();

            match self.submit_trades(trades).await {
                Ok(receipt) => {
                    info!(group = index, bundle_id = %receipt.bundle_id, "Sell bundle accepted");
                    results.push(BundleGroupResult {
                        index,
                        accounts,
                        receipt: Some(receipt),
                        error: None,
                    });
                }
                Err(err) => {
                    error!(group = index, %err, "Sell bundle failed");
                    results.push(BundleGroupResult {
                        index,
                        accounts,
                        receipt: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        results
    }

    /// Builds, signs and submits one bundle. Each trade carries the keys signing it.
    async fn submit_trades(
        &self,
        trades: Vec<(Vec<&Keypair>, TradeRequest)>,
    ) -> Result<BundleReceipt, OperationError> {
        if trades.is_empty() || trades.len() > MAX_BUNDLE_SIZE {
            return Err(RelayError::InvalidBundleSize(trades.len()).into());
        }

        let (signers, requests): (Vec<_>, Vec<_>) = trades
            .into_iter()
            .map(|(signers, request)| {
                (signers, request.with_fees(self.config.builder_slippage, self.config.priority_fee))
            })
            .unzip();

        let unsigned = self.builder.build(&requests).await?;
        let signed = unsigned
            .into_iter()
            .zip(&signers)
            .map(|(tx, keys)| trade_builder::sign(tx, keys))
            .collect::<Result<Vec<VersionedTransaction>, _>>()?;

        Ok(self.bundles.submit(&signed).await?)
    }
}

fn buy_quote(
    curve: &CurveState,
    sol_in: u64,
    slippage_bps: u64,
) -> Result<TradeQuote, OperationError> {
    Ok(TradeQuote {
        amount_out: curve.quote_buy(sol_in)?,
        bound: curve::slippage_ceiling(sol_in, slippage_bps)?,
    })
}

fn sell_quote(
    curve: &CurveState,
    global: &GlobalParameters,
    tokens_in: u64,
    slippage_bps: u64,
) -> Result<TradeQuote, OperationError> {
    let amount_out = curve.quote_sell(tokens_in, global.fee_basis_points)?;
    Ok(TradeQuote { amount_out, bound: curve::slippage_floor(amount_out, slippage_bps)? })
}
