//! Atomic bundle submission through a block engine relay.
use crate::{
    constants::MAX_BUNDLE_SIZE,
    error::RelayError,
    transport::{LedgerClient, SignatureStatus},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use serde_with::{DisplayFromStr, serde_as};
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, trace};
use url::Url;

/// Acknowledgement of a submitted bundle.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    /// Bundle id assigned by the relay.
    pub bundle_id: String,
    /// First signature of every transaction, in bundle order.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub signatures: Vec<Signature>,
}

/// Landing status of a bundled transaction.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureOutcome {
    /// The transaction signature.
    #[serde_as(as = "DisplayFromStr")]
    pub signature: Signature,
    /// Whether the transaction landed successfully before the deadline.
    pub confirmed: bool,
    /// Why the transaction failed, if it landed with an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Posts signed transactions as a single atomic bundle.
#[derive(Debug, Clone)]
pub struct BundleSubmitter {
    client: Client,
    url: Url,
}

impl BundleSubmitter {
    /// Creates a submitter for the relay at `url`.
    pub fn new(url: Url) -> Self {
        Self { client: Client::new(), url }
    }

    /// Uses the given HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The relay endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Submits `transactions` as one bundle.
    ///
    /// Does not wait for the bundle to land, see [`await_signatures`].
    pub async fn submit(
        &self,
        transactions: &[VersionedTransaction],
    ) -> Result<BundleReceipt, RelayError> {
        if transactions.is_empty() || transactions.len() > MAX_BUNDLE_SIZE {
            return Err(RelayError::InvalidBundleSize(transactions.len()));
        }

        let mut encoded = Vec::with_capacity(transactions.len());
        let mut signatures = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let signature = tx
                .signatures
                .first()
                .copied()
                .ok_or_else(|| RelayError::InvalidTransaction("unsigned transaction".into()))?;
            let bytes = bincode::serialize(tx)
                .map_err(|err| RelayError::InvalidTransaction(err.to_string()))?;
            encoded.push(bs58::encode(bytes).into_string());
            signatures.push(signature);
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded],
        });

        debug!(url = %self.url, size = transactions.len(), "Submitting bundle");
        let response = self.client.post(self.url.clone()).json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(RelayError::Status { status, body: text });
        }

        let bundle_id = parse_bundle_response(&text)?;
        info!(%bundle_id, size = signatures.len(), "Bundle accepted");

        Ok(BundleReceipt { bundle_id, signatures })
    }
}

/// Extracts the bundle id from a `sendBundle` JSON-RPC response.
pub fn parse_bundle_response(body: &str) -> Result<String, RelayError> {
    let value: Value =
        serde_json::from_str(body).map_err(|err| RelayError::MalformedResponse(err.to_string()))?;

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        return Err(RelayError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    let result = value
        .get("result")
        .filter(|result| !result.is_null())
        .ok_or_else(|| RelayError::MalformedResponse(format!("missing result: {body}")))?;

    Ok(bundle_id(result))
}

/// The id of an accepted bundle. Relays either answer with the id itself or with an object
/// carrying it.
fn bundle_id(result: &Value) -> String {
    if let Some(id) = result.as_str() {
        return id.to_string();
    }

    ["bundleId", "bundle_id", "id"]
        .iter()
        .find_map(|key| match result.get(key)? {
            Value::String(id) => Some(id.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| result.to_string())
}

/// Polls every signature until it settles or `timeout` elapses.
///
/// Never fails: signatures that did not land in time are reported as unconfirmed.
pub async fn await_signatures(
    client: &dyn LedgerClient,
    signatures: &[Signature],
    timeout: Duration,
    poll_interval: Duration,
) -> Vec<SignatureOutcome> {
    let mut outcomes: Vec<SignatureOutcome> = signatures
        .iter()
        .map(|signature| SignatureOutcome { signature: *signature, confirmed: false, error: None })
        .collect();
    let mut pending: Vec<usize> = (0..outcomes.len()).collect();
    let deadline = Instant::now() + timeout;

    while !pending.is_empty() {
        let mut still_pending = Vec::with_capacity(pending.len());
        for index in pending {
            let outcome = &mut outcomes[index];
            match client.get_signature_status(&outcome.signature).await {
                Ok(SignatureStatus::Confirmed) => outcome.confirmed = true,
                Ok(SignatureStatus::Failed(reason)) => outcome.error = Some(reason),
                Ok(SignatureStatus::Unknown | SignatureStatus::Processed) => {
                    still_pending.push(index)
                }
                Err(err) => {
                    trace!(signature = %outcome.signature, %err, "Status poll failed");
                    still_pending.push(index);
                }
            }
        }
        pending = still_pending;

        if pending.is_empty() || Instant::now() >= deadline {
            break;
        }
        sleep(poll_interval).await;
    }

    for index in pending {
        debug!(signature = %outcomes[index].signature, "Bundled transaction did not land in time");
    }

    outcomes
}
