use super::{Anchor, LedgerClient, SignatureStatus, SubmitOptions};
use crate::error::{TransportError, TransportErrorKind};
use async_trait::async_trait;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
    rpc_request::RpcError,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use std::{fmt, sync::Arc};
use tracing::trace;

/// JSON-RPC server error range, used by nodes for unhealthy or lagging states.
const SERVER_ERROR_CODES: std::ops::RangeInclusive<i64> = -32099..=-32000;

/// [`LedgerClient`] backed by a Solana JSON-RPC node.
#[derive(Clone)]
pub struct RpcLedgerClient {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("url", &self.client.url())
            .field("commitment", &self.commitment.commitment)
            .finish()
    }
}

impl RpcLedgerClient {
    /// Creates a new client for the node at `url`.
    pub fn new(url: impl ToString, commitment: CommitmentConfig) -> Self {
        let client = RpcClient::new_with_commitment(url.to_string(), commitment);
        Self { client: Arc::new(client), commitment }
    }

    /// Wraps an existing RPC client.
    pub fn with_client(client: Arc<RpcClient>) -> Self {
        let commitment = client.commitment();
        Self { client, commitment }
    }

    /// The underlying RPC client.
    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, TransportError> {
        self.client
            .get_balance_with_commitment(address, self.commitment)
            .await
            .map(|response| response.value)
            .map_err(classify_client_error)
    }

    async fn get_latest_anchor(&self) -> Result<Anchor, TransportError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(classify_client_error)?;
        Ok(Anchor { blockhash, last_valid_block_height })
    }

    async fn get_block_height(&self) -> Result<u64, TransportError> {
        self.client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(classify_client_error)
    }

    async fn submit_transaction(
        &self,
        tx: &VersionedTransaction,
        options: SubmitOptions,
    ) -> Result<Signature, TransportError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(options.preflight_commitment),
            max_retries: options.max_retries,
            ..Default::default()
        };
        let signature = self
            .client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(classify_client_error)?;
        trace!(%signature, "Submitted transaction");
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, TransportError> {
        let response = self
            .client
            .get_signature_statuses(std::slice::from_ref(signature))
            .await
            .map_err(classify_client_error)?;

        let Some(Some(status)) = response.value.into_iter().next() else {
            return Ok(SignatureStatus::Unknown);
        };

        if let Some(err) = status.err {
            return Ok(SignatureStatus::Failed(err.to_string()));
        }

        if status.satisfies_commitment(self.commitment) {
            Ok(SignatureStatus::Confirmed)
        } else {
            Ok(SignatureStatus::Processed)
        }
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, TransportError> {
        self.client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map(|response| response.value.map(|account| account.data))
            .map_err(classify_client_error)
    }
}

/// Maps a [`ClientError`] to a [`TransportError`] of the matching kind.
pub(crate) fn classify_client_error(err: ClientError) -> TransportError {
    let kind = match err.get_transaction_error() {
        Some(TransactionError::BlockhashNotFound) => TransportErrorKind::AnchorExpired,
        Some(_) => TransportErrorKind::Rejected,
        None => match err.kind() {
            ClientErrorKind::Reqwest(inner)
                if inner.status().map(|status| status.as_u16()) == Some(429) =>
            {
                TransportErrorKind::RateLimited
            }
            ClientErrorKind::Io(_)
            | ClientErrorKind::Reqwest(_)
            | ClientErrorKind::RpcError(RpcError::RpcRequestError(_)) => {
                TransportErrorKind::TransientNetwork
            }
            ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. })
                if SERVER_ERROR_CODES.contains(code) =>
            {
                TransportErrorKind::TransientNetwork
            }
            _ => TransportErrorKind::Other,
        },
    };

    TransportError::new(kind, err.to_string())
}
