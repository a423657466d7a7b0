//! Relay constants.
use solana_sdk::{pubkey, pubkey::Pubkey};
use std::time::Duration;

/// The bonding curve program.
pub const PUMP_PROGRAM_ID: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");

/// Event authority PDA of the bonding curve program, passed to every trade instruction.
pub const PUMP_EVENT_AUTHORITY: Pubkey = pubkey!("62qc2CNXwrYqQScmEdiZFFAnJR262PxWEuNQtxfafNgV");

/// SPL token program.
pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// SPL associated token account program.
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Seed of the global parameters account.
pub const GLOBAL_SEED: &[u8] = b"global";

/// Seed of bonding curve accounts.
pub const BONDING_CURVE_SEED: &[u8] = b"bonding-curve";

/// Anchor discriminator of the `buy` instruction.
pub const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];

/// Anchor discriminator of the `sell` instruction.
pub const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

/// 10000 basis points = 100%.
pub const BASIS_POINTS_DENOMINATOR: u128 = 10_000;

/// Maximum number of transfers packed into one distribution transaction.
pub const DEFAULT_DISTRIBUTE_BATCH_SIZE: usize = 8;

/// Maximum number of accounts collected concurrently.
pub const DEFAULT_COLLECT_CONCURRENCY: usize = 5;

/// Attempts per batch before its entries are recorded as failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How long to wait for a submitted transaction to confirm.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(90);

/// Interval between signature status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before rebuilding a transaction whose blockhash expired.
pub const DEFAULT_ANCHOR_EXPIRED_BACKOFF: Duration = Duration::from_secs(5);

/// Base of the exponential backoff applied when rate limited.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Delay before retrying any other transient failure.
pub const DEFAULT_TRANSIENT_BACKOFF: Duration = Duration::from_secs(2);

/// Delay between two consecutive batches.
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_secs(2);

/// Pause between balance lookups while preparing a collection.
pub const DEFAULT_BALANCE_FETCH_DELAY: Duration = Duration::from_millis(200);

/// Lamports left behind in every collected account to pay for its own transfer.
pub const DEFAULT_MIN_RESERVE: u64 = 5_000;

/// Maximum number of transactions the relay accepts in one bundle.
pub const MAX_BUNDLE_SIZE: usize = 5;

/// Default slippage for quotes and direct trades, in basis points.
pub const DEFAULT_SLIPPAGE_BPS: u64 = 500;

/// Default bundle relay endpoint.
pub const DEFAULT_RELAY_URL: &str = "https://mainnet.block-engine.jito.wtf/api/v1/bundles";

/// Default trade builder endpoint.
pub const DEFAULT_TRADE_BUILDER_URL: &str = "http://127.0.0.1:3456/api/trade-local";

/// Default Solana RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Capacity of the progress channel handed to callers.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;
