//! Scripted ledger client, fake bundle relay and fake trade builder.
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use jsonrpsee::{
    RpcModule,
    server::{Server, ServerHandle},
    types::ErrorObjectOwned,
};
use relay::{
    config::SettlementConfig,
    constants::TOKEN_PROGRAM_ID,
    curve::{CurveState, GlobalParameters},
    error::TransportError,
    ledger::{AccountLedger, RawAccount},
    settlement::RetryPolicy,
    transport::{Anchor, DynLedgerClient, LedgerClient, SignatureStatus, SubmitOptions},
};
use serde_json::Value;
use solana_sdk::{
    hash::Hash,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::VersionedTransaction,
};
use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, task::JoinHandle, time::Instant};
use url::Url;

/// Number of blocks a blockhash stays valid.
const ANCHOR_LIFETIME: u64 = 150;

/// Time between two blocks of the mock ledger.
const BLOCK_TIME: Duration = Duration::from_millis(400);

/// How a submitted transaction lands.
#[derive(Debug, Clone, Default)]
pub enum Landing {
    /// Confirmed on the first status poll.
    #[default]
    Immediate,
    /// Confirmed once the duration passed since submission.
    After(Duration),
    /// Never seen by the ledger.
    Never,
    /// Landed with an error.
    Failed(String),
}

/// Scripted outcome of a single submit call.
#[derive(Debug, Clone)]
pub enum SubmitStep {
    /// The transaction is accepted and lands as described.
    Land(Landing),
    /// The submit call itself fails.
    Fail(TransportError),
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<Pubkey, u64>,
    balance_failures: HashMap<Pubkey, TransportError>,
    accounts: HashMap<Pubkey, Vec<u8>>,
    script: VecDeque<SubmitStep>,
    submit_calls: usize,
    submitted: Vec<VersionedTransaction>,
    statuses: HashMap<Signature, (Landing, Instant)>,
}

/// In-memory [`LedgerClient`] whose submissions follow a script.
///
/// Unscripted submissions confirm immediately. Block height advances with (virtual) time.
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<State>,
    genesis: Instant,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self { state: Mutex::default(), genesis: Instant::now() }
    }
}

impl MockLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.state.lock().unwrap().balances.insert(address, lamports);
    }

    pub fn fail_balance(&self, address: Pubkey, err: TransportError) {
        self.state.lock().unwrap().balance_failures.insert(address, err);
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.state.lock().unwrap().accounts.insert(address, data);
    }

    pub fn script(&self, steps: impl IntoIterator<Item = SubmitStep>) {
        self.state.lock().unwrap().script.extend(steps);
    }

    /// Registers a signature submitted through some other path, e.g. a bundle.
    pub fn land(&self, signature: Signature, landing: Landing) {
        self.state.lock().unwrap().statuses.insert(signature, (landing, Instant::now()));
    }

    pub fn submit_calls(&self) -> usize {
        self.state.lock().unwrap().submit_calls
    }

    pub fn submitted(&self) -> Vec<VersionedTransaction> {
        self.state.lock().unwrap().submitted.clone()
    }

    fn height(&self) -> u64 {
        (self.genesis.elapsed().as_millis() / BLOCK_TIME.as_millis()) as u64
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(&self, address: &Pubkey) -> Result<u64, TransportError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = state.balance_failures.get(address) {
            return Err(err.clone());
        }
        Ok(state.balances.get(address).copied().unwrap_or_default())
    }

    async fn get_latest_anchor(&self) -> Result<Anchor, TransportError> {
        Ok(Anchor {
            blockhash: Hash::new_unique(),
            last_valid_block_height: self.height() + ANCHOR_LIFETIME,
        })
    }

    async fn get_block_height(&self) -> Result<u64, TransportError> {
        Ok(self.height())
    }

    async fn submit_transaction(
        &self,
        tx: &VersionedTransaction,
        _options: SubmitOptions,
    ) -> Result<Signature, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.submit_calls += 1;

        let landing = match state.script.pop_front() {
            Some(SubmitStep::Fail(err)) => return Err(err),
            Some(SubmitStep::Land(landing)) => landing,
            None => Landing::default(),
        };

        let signature = tx.signatures[0];
        state.submitted.push(tx.clone());
        state.statuses.insert(signature, (landing, Instant::now()));
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, TransportError> {
        let state = self.state.lock().unwrap();
        let Some((landing, submitted_at)) = state.statuses.get(signature) else {
            return Ok(SignatureStatus::Unknown);
        };

        Ok(match landing {
            Landing::Immediate => SignatureStatus::Confirmed,
            Landing::After(delay) if submitted_at.elapsed() >= *delay => SignatureStatus::Confirmed,
            Landing::After(_) | Landing::Never => SignatureStatus::Unknown,
            Landing::Failed(reason) => SignatureStatus::Failed(reason.clone()),
        })
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.state.lock().unwrap().accounts.get(address).cloned())
    }
}

/// Tight timings so tests stay short even on virtual time.
pub fn settlement_config() -> SettlementConfig {
    SettlementConfig {
        batch_size: 8,
        concurrency: 5,
        min_reserve: 5_000,
        poll_interval: Duration::from_secs(1),
        confirmation_timeout: Duration::from_secs(5),
        inter_batch_delay: Duration::from_secs(2),
        balance_fetch_delay: Duration::from_millis(200),
        retry: RetryPolicy::default().with_max_attempts(3).with_backoffs(
            Duration::from_secs(5),
            Duration::from_secs(1),
            Duration::from_secs(2),
        ),
        ..Default::default()
    }
}

/// `count` fresh participants, each requesting `amount`.
pub fn participants(count: usize, amount: u64) -> (Vec<Pubkey>, AccountLedger) {
    let keys: Vec<_> = (0..count).map(|_| Keypair::new()).collect();
    let raw = keys.iter().map(|key| RawAccount::from_keypair(key, amount)).collect();
    (keys.iter().map(Keypair::pubkey).collect(), AccountLedger::build(raw).unwrap())
}

pub fn client(ledger: &Arc<MockLedger>) -> DynLedgerClient {
    ledger.clone()
}

/// Raw account bytes of a curve.
pub fn curve_account(curve: &CurveState) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    for value in [
        curve.virtual_token_reserves,
        curve.virtual_sol_reserves,
        curve.real_token_reserves,
        curve.real_sol_reserves,
        curve.token_total_supply,
    ] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data.push(curve.complete as u8);
    data
}

/// Raw account bytes of the global parameters.
pub fn global_account(params: &GlobalParameters) -> Vec<u8> {
    let mut data = vec![0u8; 8];
    data.push(params.initialized as u8);
    data.extend_from_slice(params.authority.as_ref());
    data.extend_from_slice(params.fee_recipient.as_ref());
    for value in [
        params.initial_virtual_token_reserves,
        params.initial_virtual_sol_reserves,
        params.initial_real_token_reserves,
        params.token_total_supply,
        params.fee_basis_points,
    ] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// Mainnet launch parameters.
pub fn global_parameters() -> GlobalParameters {
    GlobalParameters {
        initialized: true,
        authority: Pubkey::new_unique(),
        fee_recipient: Pubkey::new_unique(),
        initial_virtual_token_reserves: 1_073_000_000_000_000,
        initial_virtual_sol_reserves: 30_000_000_000,
        initial_real_token_reserves: 793_100_000_000_000,
        token_total_supply: 1_000_000_000_000_000,
        fee_basis_points: 100,
    }
}

/// Bundles received by a [`FakeRelay`], as sent on the wire.
pub type ReceivedBundles = Arc<Mutex<Vec<Vec<String>>>>;

/// A local JSON-RPC server answering `sendBundle`.
pub struct FakeRelay {
    pub url: Url,
    pub received: ReceivedBundles,
    handle: ServerHandle,
}

impl FakeRelay {
    /// Accepts every bundle, or rejects every bundle with `-32602` if `reject` is set.
    pub async fn spawn(reject: bool) -> eyre::Result<Self> {
        let server = Server::builder().build("127.0.0.1:0").await?;
        let url = Url::parse(&format!("http://{}", server.local_addr()?))?;
        let received = ReceivedBundles::default();

        let mut module = RpcModule::new(received.clone());
        module.register_method("sendBundle", move |params, received, _| {
            if reject {
                return Err(ErrorObjectOwned::owned(
                    -32602,
                    "bundle contains an already processed transaction",
                    None::<()>,
                ));
            }
            let (transactions,): (Vec<String>,) = params.parse()?;
            let mut received = received.lock().unwrap();
            received.push(transactions);
            Ok(format!("bundle-{}", received.len()))
        })?;

        Ok(Self { url, received, handle: server.start(module) })
    }
}

impl Drop for FakeRelay {
    fn drop(&mut self) {
        let _ = self.handle.stop();
    }
}

/// Trade requests received by a [`FakeBuilder`], one entry per posted batch.
pub type ReceivedTrades = Arc<Mutex<Vec<Vec<Value>>>>;

/// A local trade builder answering every posted batch with one unsigned transaction per trade.
///
/// Creates require the creator and the mint to sign, every other trade only the trader.
pub struct FakeBuilder {
    pub url: Url,
    pub received: ReceivedTrades,
    task: JoinHandle<()>,
}

impl FakeBuilder {
    pub async fn spawn() -> eyre::Result<Self> {
        let received = ReceivedTrades::default();
        let (url, task) = serve({
            let received = received.clone();
            move |req| build_trades(req, received.clone())
        })
        .await?;
        Ok(Self { url, received, task })
    }
}

impl Drop for FakeBuilder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A local HTTP endpoint answering every request with the same error status.
pub struct FailingEndpoint {
    pub url: Url,
    task: JoinHandle<()>,
}

impl FailingEndpoint {
    pub async fn spawn(status: u16) -> eyre::Result<Self> {
        let (url, task) = serve(move |_| async move {
            let response = Response::builder()
                .status(status)
                .body(Full::new(Bytes::from_static(b"service unavailable")))
                .unwrap();
            Ok::<_, hyper::Error>(response)
        })
        .await?;
        Ok(Self { url, task })
    }
}

impl Drop for FailingEndpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serves `handler` over HTTP/1 on a random local port.
async fn serve<H, F>(handler: H) -> eyre::Result<(Url, JoinHandle<()>)>
where
    H: Fn(Request<Incoming>) -> F + Clone + Send + Sync + 'static,
    F: Future<Output = Result<Response<Full<Bytes>>, hyper::Error>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = Url::parse(&format!("http://{}", listener.local_addr()?))?;

    let task = tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(handler);
                if let Err(err) =
                    http1::Builder::new().serve_connection(TokioIo::new(tcp), service).await
                {
                    eprintln!("Error serving connection: {err:?}");
                }
            });
        }
    });

    Ok((url, task))
}

async fn build_trades(
    req: Request<Incoming>,
    received: ReceivedTrades,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let body = req.collect().await?.to_bytes();
    let trades: Vec<Value> = serde_json::from_slice(&body).unwrap();
    let encoded: Vec<String> = trades.iter().map(unsigned_trade).collect();
    received.lock().unwrap().push(trades);

    Ok(Response::builder()
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&encoded).unwrap())))
        .unwrap())
}

/// Base58 encoded unsigned transaction for a posted trade.
fn unsigned_trade(trade: &Value) -> String {
    let user: Pubkey = trade["publicKey"].as_str().unwrap().parse().unwrap();
    let mint: Pubkey = trade["mint"].as_str().unwrap().parse().unwrap();
    let ix = match trade["action"].as_str() {
        Some("create") => {
            system_instruction::create_account(&user, &mint, 1_461_600, 82, &TOKEN_PROGRAM_ID)
        }
        _ => system_instruction::transfer(&user, &mint, 1),
    };

    let message = Message::new_with_blockhash(&[ix], Some(&user), &Hash::new_unique());
    let unsigned = VersionedTransaction {
        signatures: vec![Signature::default(); message.header.num_required_signatures as usize],
        message: VersionedMessage::Legacy(message),
    };
    bs58::encode(bincode::serialize(&unsigned).unwrap()).into_string()
}
