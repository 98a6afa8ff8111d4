//! JSON-RPC chain client for EVM-compatible chains.
//!
//! Each wallet session owns its own HTTP client so that a wallet's proxy
//! never leaks into another wallet's traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{keccak256, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use chainflow_core::{Asset, ChainCall, Wallet};

use crate::abi;
use crate::client::{
    BoxFuture, ChainClient, ChainClientFactory, DynChainClient, SignedTransaction,
    TransactionReceipt,
};
use crate::error::{ChainError, ChainResult};
use crate::oracle::GasPriceOracle;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for an EVM JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub url: String,
    pub chain_id: u64,
    /// Per-request timeout (default: 15s).
    pub request_timeout: Duration,
    /// Gas limit used when estimation of a dependent call fails (default: 300000).
    pub fallback_gas_limit: u64,
    /// Priority fee per gas in wei (default: 1 gwei).
    pub priority_fee_wei: u128,
    /// Receipt polling interval (default: 2s).
    pub receipt_poll_interval: Duration,
}

impl RpcSettings {
    pub fn new(url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            url: url.into(),
            chain_id,
            request_timeout: DEFAULT_TIMEOUT,
            fallback_gas_limit: 300_000,
            priority_fee_wei: 1_000_000_000,
            receipt_poll_interval: Duration::from_secs(2),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

/// Minimal JSON-RPC 2.0 transport over HTTP.
#[derive(Debug)]
pub struct JsonRpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a transport, optionally routed through `proxy`.
    pub fn new(url: impl Into<String>, timeout: Duration, proxy: Option<&str>) -> ChainResult<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ChainError::InvalidProxy(format!("{proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| ChainError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Call `method`, returning `None` for a null result.
    pub async fn request_opt<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> ChainResult<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.http.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChainError::Http(format!("HTTP {status}: {text}")));
        }

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{method}: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(ChainError::from_rpc(err.code, err.message));
        }
        Ok(parsed.result)
    }

    /// Call `method`, treating a null result as an error.
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        self.request_opt(method, params)
            .await?
            .ok_or_else(|| ChainError::Decode(format!("{method}: empty result")))
    }

    async fn quantity(&self, method: &str, params: Value) -> ChainResult<u128> {
        let hex: String = self.request(method, params).await?;
        parse_quantity(&hex)
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(s: &str) -> ChainResult<u128> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("invalid quantity {s}: {e}")))
}

fn quantity_hex(value: u128) -> String {
    format!("0x{value:x}")
}

fn data_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn decode_data(s: &str) -> ChainResult<Vec<u8>> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| ChainError::Decode(format!("invalid hex data: {e}")))
}

fn signer_for(wallet: &Wallet) -> ChainResult<PrivateKeySigner> {
    let secret = wallet.credential().expose();
    let bytes = hex::decode(secret.strip_prefix("0x").unwrap_or(secret))
        .map_err(|_| ChainError::Signing("credential is not hex".to_string()))?;
    PrivateKeySigner::from_slice(&bytes).map_err(|e| ChainError::Signing(e.to_string()))
}

// ============================================================================
// Chain client
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: Option<String>,
    block_number: Option<String>,
}

/// EVM chain client for one wallet session.
#[derive(Debug)]
pub struct JsonRpcChainClient {
    rpc: JsonRpcClient,
    settings: RpcSettings,
}

impl JsonRpcChainClient {
    pub fn new(rpc: JsonRpcClient, settings: RpcSettings) -> Self {
        Self { rpc, settings }
    }

    async fn estimate_gas(&self, from: &str, call: &ChainCall) -> ChainResult<u64> {
        let gas = self
            .rpc
            .quantity(
                "eth_estimateGas",
                json!([{
                    "from": from,
                    "to": call.to,
                    "data": data_hex(&call.data),
                    "value": quantity_hex(call.value),
                }]),
            )
            .await?;
        u64::try_from(gas).map_err(|_| ChainError::Decode(format!("gas {gas} exceeds u64")))
    }
}

impl ChainClient for JsonRpcChainClient {
    fn get_balance<'a>(
        &'a self,
        owner: &'a str,
        asset: &'a Asset,
    ) -> BoxFuture<'a, ChainResult<u128>> {
        Box::pin(async move {
            match &asset.address {
                None => {
                    self.rpc
                        .quantity("eth_getBalance", json!([owner, "latest"]))
                        .await
                }
                Some(token) => {
                    let call = abi::balance_of_call(token, owner)?;
                    let data = self.call(&call).await?;
                    abi::decode_balance_of(&data)
                }
            }
        })
    }

    fn decimals<'a>(&'a self, asset: &'a Asset) -> BoxFuture<'a, ChainResult<u8>> {
        Box::pin(async move {
            if let Some(decimals) = asset.decimals {
                return Ok(decimals);
            }
            match &asset.address {
                None => Ok(18),
                Some(token) => {
                    let data = self.call(&abi::decimals_call(token)).await?;
                    abi::decode_decimals(&data)
                }
            }
        })
    }

    fn call<'a>(&'a self, call: &'a ChainCall) -> BoxFuture<'a, ChainResult<Vec<u8>>> {
        Box::pin(async move {
            let result: String = self
                .rpc
                .request(
                    "eth_call",
                    json!([{ "to": call.to, "data": data_hex(&call.data) }, "latest"]),
                )
                .await?;
            decode_data(&result)
        })
    }

    fn sign<'a>(
        &'a self,
        wallet: &'a Wallet,
        calls: &'a [ChainCall],
    ) -> BoxFuture<'a, ChainResult<SignedTransaction>> {
        Box::pin(async move {
            if calls.is_empty() {
                return Err(ChainError::Signing("no calls to sign".to_string()));
            }
            let signer = signer_for(wallet)?;
            let from = signer.address().to_string();

            let nonce = self
                .rpc
                .quantity("eth_getTransactionCount", json!([from, "pending"]))
                .await?;
            let mut nonce = u64::try_from(nonce)
                .map_err(|_| ChainError::Decode(format!("nonce {nonce} exceeds u64")))?;
            let gas_price = self.rpc.quantity("eth_gasPrice", json!([])).await?;
            let max_fee_per_gas = gas_price.saturating_mul(2);
            let max_priority_fee_per_gas = self.settings.priority_fee_wei.min(max_fee_per_gas);

            let mut raw = Vec::with_capacity(calls.len());
            let mut total_gas: u128 = 0;
            let mut last_hash = String::new();

            for (idx, call) in calls.iter().enumerate() {
                // Later calls may depend on earlier ones (approve then swap)
                // and cannot be simulated before those are mined.
                let gas_limit = match self.estimate_gas(&from, call).await {
                    Ok(gas) => gas,
                    Err(e) if idx > 0 => {
                        debug!(error = %e, idx, "Gas estimation failed, using fallback limit");
                        self.settings.fallback_gas_limit
                    }
                    Err(e) => return Err(e),
                };
                total_gas += u128::from(gas_limit);

                let tx = TxEip1559 {
                    chain_id: self.settings.chain_id,
                    nonce,
                    gas_limit,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                    to: TxKind::Call(abi::parse_address(&call.to)?),
                    value: U256::from(call.value),
                    access_list: Default::default(),
                    input: Bytes::from(call.data.clone()),
                };
                let signature = signer
                    .sign_hash(&tx.signature_hash())
                    .await
                    .map_err(|e| ChainError::Signing(e.to_string()))?;
                let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));
                let encoded = envelope.encoded_2718();
                last_hash = keccak256(&encoded).to_string();
                raw.push(encoded);
                nonce += 1;
            }

            Ok(SignedTransaction {
                raw,
                hash: last_hash,
                fee_hint: Some(total_gas.saturating_mul(max_fee_per_gas)),
            })
        })
    }

    fn estimate_fee<'a>(&'a self, tx: &'a SignedTransaction) -> BoxFuture<'a, ChainResult<u128>> {
        Box::pin(async move {
            tx.fee_hint
                .ok_or_else(|| ChainError::Decode("transaction carries no gas parameters".into()))
        })
    }

    fn submit<'a>(&'a self, tx: &'a SignedTransaction) -> BoxFuture<'a, ChainResult<String>> {
        Box::pin(async move {
            let mut last = None;
            for encoded in &tx.raw {
                let hash: String = self
                    .rpc
                    .request("eth_sendRawTransaction", json!([data_hex(encoded)]))
                    .await?;
                debug!(tx_hash = %hash, "Transaction broadcast");
                last = Some(hash);
            }
            last.ok_or_else(|| ChainError::Signing("empty transaction".to_string()))
        })
    }

    fn wait_for_receipt<'a>(
        &'a self,
        tx_hash: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, ChainResult<TransactionReceipt>> {
        Box::pin(async move {
            let poll = async {
                loop {
                    let receipt: Option<RawReceipt> = self
                        .rpc
                        .request_opt("eth_getTransactionReceipt", json!([tx_hash]))
                        .await?;
                    if let Some(receipt) = receipt {
                        let success = receipt
                            .status
                            .as_deref()
                            .map(parse_quantity)
                            .transpose()?
                            .map_or(true, |s| s == 1);
                        let block_number = receipt
                            .block_number
                            .as_deref()
                            .map(parse_quantity)
                            .transpose()?
                            .and_then(|n| u64::try_from(n).ok());
                        return Ok(TransactionReceipt {
                            tx_hash: tx_hash.to_string(),
                            success,
                            block_number,
                        });
                    }
                    tokio::time::sleep(self.settings.receipt_poll_interval).await;
                }
            };
            match tokio::time::timeout(timeout, poll).await {
                Ok(result) => result,
                Err(_) => Err(ChainError::Timeout(format!(
                    "no receipt for {tx_hash} within {}s",
                    timeout.as_secs()
                ))),
            }
        })
    }
}

// ============================================================================
// Gas oracle and factory
// ============================================================================

/// Gas price oracle backed by `eth_gasPrice`.
#[derive(Debug)]
pub struct JsonRpcGasOracle {
    rpc: JsonRpcClient,
}

impl JsonRpcGasOracle {
    pub fn new(url: impl Into<String>) -> ChainResult<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(url, DEFAULT_TIMEOUT, None)?,
        })
    }
}

impl GasPriceOracle for JsonRpcGasOracle {
    fn gas_price_wei(&self) -> BoxFuture<'_, ChainResult<u128>> {
        Box::pin(async move { self.rpc.quantity("eth_gasPrice", json!([])).await })
    }
}

/// Opens one JSON-RPC session per wallet, routed through its proxy.
#[derive(Debug, Clone)]
pub struct JsonRpcChainFactory {
    settings: RpcSettings,
}

impl JsonRpcChainFactory {
    pub fn new(settings: RpcSettings) -> Self {
        Self { settings }
    }
}

impl ChainClientFactory for JsonRpcChainFactory {
    fn connect<'a>(&'a self, wallet: &'a Wallet) -> BoxFuture<'a, ChainResult<DynChainClient>> {
        Box::pin(async move {
            let rpc = JsonRpcClient::new(
                &self.settings.url,
                self.settings.request_timeout,
                wallet.proxy(),
            )
            .map_err(|e| {
                warn!(wallet = %wallet.id(), error = %e, "Failed to open chain session");
                e
            })?;
            let client: DynChainClient =
                Arc::new(JsonRpcChainClient::new(rpc, self.settings.clone()));
            Ok(client)
        })
    }
}
