//! # Settler CLI
use crate::{
    bundle::await_signatures,
    config::SettlerConfig,
    ledger::AccountLedger,
    metrics::setup_exporter,
    orchestrator::Orchestrator,
    settlement::{OperationHandle, OperationReport},
    trade::Trader,
    transport::{DynLedgerClient, RpcLedgerClient},
};
use clap::{Parser, Subcommand};
use eyre::Context;
use futures_util::StreamExt;
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signer};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn};
use url::Url;

/// Prices bonding curve trades and settles funds across many wallets.
#[derive(Debug, Parser)]
#[command(author, about = "Curve relay", long_about = None)]
pub struct Args {
    /// The configuration file.
    ///
    /// If missing, a default one will be used and stored under this path.
    #[arg(long, value_name = "CONFIG", env = "SETTLER_CONFIG", default_value = "settler.yaml")]
    pub config: PathBuf,
    /// The JSON-RPC endpoint of the chain.
    #[arg(long = "rpc-url", value_name = "RPC_ENDPOINT", env = "RPC_URL")]
    pub rpc_url: Option<Url>,
    /// The block engine bundle endpoint.
    #[arg(long = "relay-url", value_name = "URL")]
    pub relay_url: Option<Url>,
    /// The trade builder endpoint.
    #[arg(long = "trade-builder-url", value_name = "URL")]
    pub trade_builder_url: Option<Url>,
    /// The base58 secret key of the fee payer.
    #[arg(
        long = "fee-payer-key",
        value_name = "SECRET_KEY",
        env = "FEE_PAYER_KEY",
        hide_env_values = true
    )]
    pub fee_payer_key: Option<String>,
    /// The address to serve Prometheus metrics on. Metrics are not exported if unset.
    #[arg(long = "metrics-addr", value_name = "ADDR")]
    pub metrics_addr: Option<SocketAddr>,
    /// The command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Settler commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Quotes the tokens received for a buy.
    QuoteBuy {
        /// The traded mint.
        #[arg(long)]
        mint: Pubkey,
        /// Lamports to spend.
        #[arg(long)]
        lamports: u64,
        /// Slippage in basis points. Defaults to the configured one.
        #[arg(long)]
        slippage_bps: Option<u64>,
    },
    /// Quotes the lamports received for a sell.
    QuoteSell {
        /// The traded mint.
        #[arg(long)]
        mint: Pubkey,
        /// Tokens to sell, in base units.
        #[arg(long)]
        tokens: u64,
        /// Slippage in basis points. Defaults to the configured one.
        #[arg(long)]
        slippage_bps: Option<u64>,
    },
    /// Pays every participant from the fee payer.
    Distribute {
        /// Pays every participant this many lamports instead of its configured amount.
        #[arg(long)]
        amount: Option<u64>,
    },
    /// Sweeps every participant into the fee payer, or into `destination`.
    Collect {
        /// Receiving account. Defaults to the fee payer.
        #[arg(long)]
        destination: Option<Pubkey>,
        /// Lamports left behind in every participant.
        #[arg(long)]
        min_reserve: Option<u64>,
    },
    /// Sells the whole token balance of every participant through bundles.
    SellAll {
        /// The traded mint.
        #[arg(long)]
        mint: Pubkey,
        /// Wait for the bundled transactions to land.
        #[arg(long, default_value_t = false)]
        wait: bool,
    },
}

impl Args {
    /// Runs the command.
    pub async fn run(self) -> eyre::Result<()> {
        if let Some(addr) = self.metrics_addr {
            setup_exporter(addr)?;
        }

        let config = if self.config.exists() {
            SettlerConfig::load_from_file(&self.config)?
        } else {
            let config = SettlerConfig::default();
            config.save_to_file(&self.config).wrap_err_with(|| {
                format!("failed to write default config to {}", self.config.display())
            })?;
            info!(path = %self.config.display(), "Wrote default config");
            config
        };
        let command = self.command;
        let config = Self::merge(
            config,
            self.rpc_url,
            self.relay_url,
            self.trade_builder_url,
            self.fee_payer_key,
        );

        let client: DynLedgerClient = Arc::new(RpcLedgerClient::new(
            &config.chain.rpc_url,
            config.chain.commitment_config(),
        ));

        match command {
            Command::QuoteBuy { mint, lamports, slippage_bps } => {
                let trader = Trader::from_config(client, &config)?;
                let slippage = slippage_bps.unwrap_or(config.bundle.slippage_bps);
                print_json(&trader.quote_buy(&mint, lamports, slippage).await?)
            }
            Command::QuoteSell { mint, tokens, slippage_bps } => {
                let trader = Trader::from_config(client, &config)?;
                let slippage = slippage_bps.unwrap_or(config.bundle.slippage_bps);
                print_json(&trader.quote_sell(&mint, tokens, slippage).await?)
            }
            Command::Distribute { amount } => {
                let payer = Arc::new(config.secrets.fee_payer()?);
                let mut ledger = AccountLedger::build(config.secrets.participants.clone())?;
                if let Some(amount) = amount {
                    ledger = ledger.with_uniform_amount(amount);
                }

                let orchestrator = Orchestrator::new(client, config.settlement);
                let report = watch(orchestrator.spawn_distribute(payer, ledger)).await?;
                print_json(&report)
            }
            Command::Collect { destination, min_reserve } => {
                let destination = match destination {
                    Some(destination) => destination,
                    None => config.secrets.fee_payer()?.pubkey(),
                };
                let ledger = AccountLedger::build(config.secrets.participants.clone())?;
                let min_reserve = min_reserve.unwrap_or(config.settlement.min_reserve);

                let orchestrator = Orchestrator::new(client, config.settlement);
                let report =
                    watch(orchestrator.spawn_collect(destination, ledger, min_reserve)).await?;
                print_json(&report)
            }
            Command::SellAll { mint, wait } => {
                let ledger = AccountLedger::build(config.secrets.participants.clone())?;
                let sellers: Vec<_> = ledger.entries().iter().map(|entry| &entry.keypair).collect();

                let trader = Trader::from_config(client.clone(), &config)?;
                let groups = trader.sell_all_bundle(&mint, &sellers).await;
                print_json(&groups)?;

                if wait {
                    let signatures: Vec<_> = groups
                        .iter()
                        .filter_map(|group| group.receipt.as_ref())
                        .flat_map(|receipt| receipt.signatures.iter().copied())
                        .collect();
                    let outcomes = await_signatures(
                        client.as_ref(),
                        &signatures,
                        config.settlement.confirmation_timeout,
                        config.settlement.poll_interval,
                    )
                    .await;
                    print_json(&outcomes)?;
                }
                Ok(())
            }
        }
    }

    /// Merges CLI overrides into an existing [`SettlerConfig`].
    fn merge(
        mut config: SettlerConfig,
        rpc_url: Option<Url>,
        relay_url: Option<Url>,
        trade_builder_url: Option<Url>,
        fee_payer_key: Option<String>,
    ) -> SettlerConfig {
        if let Some(url) = rpc_url {
            config = config.with_rpc_url(url);
        }
        if let Some(url) = relay_url {
            config = config.with_relay_url(url);
        }
        if let Some(url) = trade_builder_url {
            config = config.with_trade_builder_url(url);
        }
        if let Some(key) = fee_payer_key {
            config = config.with_fee_payer_key(key);
        }
        config
    }
}

/// Logs progress until the operation finishes. Ctrl-C cancels the operation.
async fn watch(mut handle: OperationHandle) -> eyre::Result<OperationReport> {
    let cancel = handle.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining batches");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.progress().next().await {
        info!(completed = event.completed, total = event.total, detail = %event.detail, "Progress");
    }

    let report = handle.report().await;
    interrupt.abort();
    Ok(report?)
}

fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
