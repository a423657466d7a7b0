//! Settler configuration.
use crate::{
    constants::{
        DEFAULT_BALANCE_FETCH_DELAY, DEFAULT_COLLECT_CONCURRENCY, DEFAULT_CONFIRMATION_TIMEOUT,
        DEFAULT_DISTRIBUTE_BATCH_SIZE, DEFAULT_INTER_BATCH_DELAY, DEFAULT_MIN_RESERVE,
        DEFAULT_POLL_INTERVAL, DEFAULT_RELAY_URL, DEFAULT_RPC_URL, DEFAULT_SLIPPAGE_BPS,
        DEFAULT_TRADE_BUILDER_URL,
    },
    ledger::{RawAccount, decode_keypair},
    settlement::RetryPolicy,
    transport::SubmitOptions,
};
use eyre::{Context, OptionExt};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    signature::Keypair,
};
use std::{fmt, path::Path, time::Duration};
use url::Url;

/// Settler configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlerConfig {
    /// Chain access.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Settlement engine tuning.
    #[serde(default)]
    pub settlement: SettlementConfig,
    /// Bundle relay and trade builder.
    #[serde(default)]
    pub bundle: BundleConfig,
    /// Secrets.
    #[serde(skip_serializing, default)]
    pub secrets: SecretsConfig,
}

impl SettlerConfig {
    /// Sets the RPC endpoint.
    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.chain.rpc_url = rpc_url.into();
        self
    }

    /// Sets the commitment used for reads and confirmations.
    pub fn with_commitment(mut self, commitment: CommitmentLevel) -> Self {
        self.chain.commitment = commitment;
        self
    }

    /// Sets the number of transfers per distribution transaction.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.settlement.batch_size = batch_size;
        self
    }

    /// Sets the number of accounts collected in parallel.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.settlement.concurrency = concurrency;
        self
    }

    /// Sets the lamports left behind in collected accounts.
    pub fn with_min_reserve(mut self, min_reserve: u64) -> Self {
        self.settlement.min_reserve = min_reserve;
        self
    }

    /// Sets the number of attempts per transaction.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.settlement.retry.max_attempts = max_attempts;
        self
    }

    /// Sets the confirmation timeout.
    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.settlement.confirmation_timeout = timeout;
        self
    }

    /// Sets the delay between batches.
    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.settlement.inter_batch_delay = delay;
        self
    }

    /// Sets the bundle relay endpoint.
    pub fn with_relay_url(mut self, relay_url: impl Into<String>) -> Self {
        self.bundle.relay_url = relay_url.into();
        self
    }

    /// Sets the trade builder endpoint.
    pub fn with_trade_builder_url(mut self, url: impl Into<String>) -> Self {
        self.bundle.trade_builder_url = url.into();
        self
    }

    /// Sets the fee payer secret key.
    pub fn with_fee_payer_key(mut self, key: impl Into<String>) -> Self {
        self.secrets.fee_payer_key = Some(key.into());
        self
    }

    /// Sets the participant wallets.
    pub fn with_participants(mut self, participants: Vec<RawAccount>) -> Self {
        self.secrets.participants = participants;
        self
    }

    /// Load from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to read config file: {}", path.display()))?;
        let config = serde_yaml::from_reader(&file)
            .wrap_err_with(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save to a YAML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> eyre::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Chain access configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Commitment for reads and confirmations.
    pub commitment: CommitmentLevel,
}

impl ChainConfig {
    /// The commitment as a [`CommitmentConfig`].
    pub fn commitment_config(&self) -> CommitmentConfig {
        CommitmentConfig { commitment: self.commitment }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { rpc_url: DEFAULT_RPC_URL.to_string(), commitment: CommitmentLevel::Confirmed }
    }
}

/// Settlement engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettlementConfig {
    /// Transfers per distribution transaction.
    pub batch_size: usize,
    /// Accounts collected in parallel.
    pub concurrency: usize,
    /// Lamports left behind in every collected account.
    pub min_reserve: u64,
    /// Interval between signature status polls.
    #[serde(with = "crate::serde::duration")]
    pub poll_interval: Duration,
    /// How long to wait for a transaction to confirm.
    #[serde(with = "crate::serde::duration")]
    pub confirmation_timeout: Duration,
    /// Delay between two batches.
    #[serde(with = "crate::serde::duration")]
    pub inter_batch_delay: Duration,
    /// Pause between balance lookups before a collection.
    #[serde(with = "crate::serde::duration")]
    pub balance_fetch_delay: Duration,
    /// Retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Submission options.
    #[serde(default)]
    pub submit: SubmitOptions,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_DISTRIBUTE_BATCH_SIZE,
            concurrency: DEFAULT_COLLECT_CONCURRENCY,
            min_reserve: DEFAULT_MIN_RESERVE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
            balance_fetch_delay: DEFAULT_BALANCE_FETCH_DELAY,
            retry: RetryPolicy::default(),
            submit: SubmitOptions::default(),
        }
    }
}

/// Bundle relay and trade builder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundleConfig {
    /// Block engine bundle endpoint.
    pub relay_url: String,
    /// Trade builder endpoint.
    pub trade_builder_url: String,
    /// Slippage sent to the trade builder, in the builder's own unit.
    pub builder_slippage: u64,
    /// Priority fee in SOL sent to the trade builder.
    pub priority_fee: f64,
    /// Slippage for quotes and direct trades, in basis points.
    pub slippage_bps: u64,
}

impl BundleConfig {
    /// The parsed relay endpoint.
    pub fn relay_url(&self) -> eyre::Result<Url> {
        Url::parse(&self.relay_url)
            .wrap_err_with(|| format!("invalid relay url {}", self.relay_url))
    }

    /// The parsed trade builder endpoint.
    pub fn trade_builder_url(&self) -> eyre::Result<Url> {
        Url::parse(&self.trade_builder_url)
            .wrap_err_with(|| format!("invalid trade builder url {}", self.trade_builder_url))
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            trade_builder_url: DEFAULT_TRADE_BUILDER_URL.to_string(),
            builder_slippage: 1000,
            priority_fee: 0.0001,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
        }
    }
}

/// Secrets. Never written back to disk.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsConfig {
    /// Base58 secret key of the account funding distributions and receiving collections.
    #[serde(default)]
    pub fee_payer_key: Option<String>,
    /// Participant wallets, in order.
    #[serde(default)]
    pub participants: Vec<RawAccount>,
}

impl SecretsConfig {
    /// Decodes the fee payer key.
    pub fn fee_payer(&self) -> eyre::Result<Keypair> {
        let key = self.fee_payer_key.as_deref().ok_or_eyre("missing fee payer key")?;
        decode_keypair(key).ok_or_eyre("invalid fee payer key")
    }
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("fee_payer_key", &self.fee_payer_key.as_ref().map(|_| "<redacted>"))
            .field("participants", &self.participants.len())
            .finish()
    }
}
