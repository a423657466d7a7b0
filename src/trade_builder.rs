//! Client for the trade builder service, which returns unsigned trade transactions.
use crate::error::RelayError;
use reqwest::Client;
use serde::{Deserialize, Serialize, Serializer};
use serde_with::{DisplayFromStr, serde_as};
use solana_sdk::{pubkey::Pubkey, signature::Keypair, transaction::VersionedTransaction};
use tracing::debug;
use url::Url;

/// Kind of trade requested from the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    /// Launch a new mint together with the creator's first buy.
    Create,
    /// Buy tokens.
    Buy,
    /// Sell tokens.
    Sell,
}

/// Amount of a trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeAmount {
    /// SOL for buys, tokens for sells. Serialized as a plain number.
    Value(f64),
    /// Percentage of the current token balance. Serialized as `"<n>%"`.
    Percent(u8),
}

impl Serialize for TradeAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(value) => serializer.serialize_f64(*value),
            Self::Percent(percent) => serializer.serialize_str(&format!("{percent}%")),
        }
    }
}

/// Metadata of a mint being created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Token name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// Uri of the uploaded metadata JSON.
    pub uri: String,
}

/// A single trade sent to the builder.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    /// The trading account.
    #[serde_as(as = "DisplayFromStr")]
    pub public_key: Pubkey,
    /// Kind of trade.
    pub action: TradeAction,
    /// Metadata, only for [`TradeAction::Create`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_metadata: Option<TokenMetadata>,
    /// The traded mint.
    #[serde_as(as = "DisplayFromStr")]
    pub mint: Pubkey,
    /// Whether `amount` is denominated in SOL. The builder expects `"true"` or `"false"`.
    #[serde_as(as = "DisplayFromStr")]
    pub denominated_in_sol: bool,
    /// Trade amount.
    pub amount: TradeAmount,
    /// Slippage, forwarded as is.
    pub slippage: u64,
    /// Priority fee in SOL.
    pub priority_fee: f64,
    /// Pool to trade on.
    pub pool: String,
}

impl TradeRequest {
    fn new(action: TradeAction, public_key: Pubkey, mint: Pubkey, amount: TradeAmount) -> Self {
        Self {
            public_key,
            action,
            token_metadata: None,
            mint,
            denominated_in_sol: matches!(amount, TradeAmount::Value(_))
                && action != TradeAction::Sell,
            amount,
            slippage: 0,
            priority_fee: 0.0,
            pool: "pump".to_string(),
        }
    }

    /// Launches `mint` with `metadata`, buying `sol` worth of tokens for `creator`.
    pub fn create(creator: Pubkey, mint: Pubkey, metadata: TokenMetadata, sol: f64) -> Self {
        Self {
            token_metadata: Some(metadata),
            ..Self::new(TradeAction::Create, creator, mint, TradeAmount::Value(sol))
        }
    }

    /// Buys `sol` worth of `mint` for `buyer`.
    pub fn buy(buyer: Pubkey, mint: Pubkey, sol: f64) -> Self {
        Self::new(TradeAction::Buy, buyer, mint, TradeAmount::Value(sol))
    }

    /// Sells the whole balance of `mint` held by `seller`.
    pub fn sell_all(seller: Pubkey, mint: Pubkey) -> Self {
        Self::new(TradeAction::Sell, seller, mint, TradeAmount::Percent(100))
    }

    /// Sets slippage and priority fee.
    pub fn with_fees(mut self, slippage: u64, priority_fee: f64) -> Self {
        self.slippage = slippage;
        self.priority_fee = priority_fee;
        self
    }
}

/// Client for the trade builder endpoint.
#[derive(Debug, Clone)]
pub struct TradeBuilderClient {
    client: Client,
    url: Url,
}

impl TradeBuilderClient {
    /// Creates a client for the builder at `url`.
    pub fn new(url: Url) -> Self {
        Self { client: Client::new(), url }
    }

    /// Uses the given HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Requests one unsigned transaction per trade, returned in request order.
    pub async fn build(
        &self,
        requests: &[TradeRequest],
    ) -> Result<Vec<VersionedTransaction>, RelayError> {
        debug!(url = %self.url, trades = requests.len(), "Requesting trade transactions");
        let response = self.client.post(self.url.clone()).json(requests).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Status { status, body });
        }

        let encoded: Vec<String> = response
            .json()
            .await
            .map_err(|err| RelayError::MalformedResponse(err.to_string()))?;
        if encoded.len() != requests.len() {
            return Err(RelayError::MalformedResponse(format!(
                "expected {} transactions, got {}",
                requests.len(),
                encoded.len()
            )));
        }

        encoded.iter().map(String::as_str).map(decode_transaction).collect()
    }
}

/// Decodes a base58 encoded, bincode serialized transaction.
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, RelayError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|err| RelayError::InvalidTransaction(err.to_string()))?;
    bincode::deserialize(&bytes).map_err(|err| RelayError::InvalidTransaction(err.to_string()))
}

/// Signs an unsigned builder transaction with `signers`.
///
/// The signer set must match the signatures required by the message exactly.
pub fn sign(
    unsigned: VersionedTransaction,
    signers: &[&Keypair],
) -> Result<VersionedTransaction, RelayError> {
    VersionedTransaction::try_new(unsigned.message, signers)
        .map_err(|err| RelayError::InvalidTransaction(err.to_string()))
}
