//! Ledger client abstraction.
//!
//! The settlement engine and the trader only ever talk to the chain through [`LedgerClient`]. The
//! production implementation is [`RpcLedgerClient`], tests plug in scripted clients.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::CommitmentLevel, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use std::{fmt, sync::Arc};

mod rpc;
pub use rpc::RpcLedgerClient;

/// Byte range of the amount inside an SPL token account.
const TOKEN_ACCOUNT_AMOUNT_OFFSET: usize = 64;

/// Shared, type erased [`LedgerClient`].
pub type DynLedgerClient = Arc<dyn LedgerClient>;

/// A recent blockhash together with the last block height at which transactions referencing it
/// are still accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// The blockhash.
    pub blockhash: Hash,
    /// Last block height at which the blockhash is valid.
    pub last_valid_block_height: u64,
}

/// Options for [`LedgerClient::submit_transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmitOptions {
    /// Skip the preflight simulation.
    pub skip_preflight: bool,
    /// Commitment used for the preflight simulation.
    pub preflight_commitment: CommitmentLevel,
    /// How often the RPC node itself should rebroadcast.
    pub max_retries: Option<usize>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            preflight_commitment: CommitmentLevel::Confirmed,
            max_retries: Some(3),
        }
    }
}

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The signature is not known to the node yet.
    Unknown,
    /// Seen, but not yet at the requested commitment.
    Processed,
    /// Landed successfully at the requested commitment.
    Confirmed,
    /// Landed with an error.
    Failed(String),
}

/// Asynchronous access to the ledger.
#[async_trait]
pub trait LedgerClient: fmt::Debug + Send + Sync {
    /// Balance of `address` in lamports.
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, TransportError>;

    /// Latest blockhash and its expiry height.
    async fn get_latest_anchor(&self) -> Result<Anchor, TransportError>;

    /// Current block height.
    async fn get_block_height(&self) -> Result<u64, TransportError>;

    /// Submits a signed transaction and returns its signature.
    async fn submit_transaction(
        &self,
        tx: &VersionedTransaction,
        options: SubmitOptions,
    ) -> Result<Signature, TransportError>;

    /// Current status of `signature`.
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, TransportError>;

    /// Raw data of the account at `address`, `None` if it does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, TransportError>;

    /// Raw amount held by the token account at `address`, `None` if it does not exist.
    async fn get_token_balance(&self, address: &Pubkey) -> Result<Option<u64>, TransportError> {
        let Some(data) = self.get_account_data(address).await? else {
            return Ok(None);
        };
        decode_token_amount(&data).map(Some)
    }
}

/// Reads the amount field of an SPL token account.
pub fn decode_token_amount(data: &[u8]) -> Result<u64, TransportError> {
    data.get(TOKEN_ACCOUNT_AMOUNT_OFFSET..TOKEN_ACCOUNT_AMOUNT_OFFSET + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| {
            TransportError::other(format!("token account too short: {} bytes", data.len()))
        })
}
