//! Fullnode JSON-RPC seam.
//!
//! [`ChainRpc`] is the minimal surface the gateway needs: build Move-call
//! transaction bytes, execute a signed transaction, read back effects, and
//! list the sponsor's gas coins. [`JsonRpcChain`] implements it over reqwest
//! against a Sui fullnode; tests implement it in-memory.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Move-call build request, mirroring `unsafe_moveCall`.
#[derive(Debug, Clone)]
pub struct MoveCallRequest {
    pub signer: String,
    pub package_object_id: String,
    pub module: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
    /// Explicit gas payment object owned by the sponsor.
    pub gas: String,
    pub gas_budget: u64,
}

#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub digest: String,
    pub success: bool,
    /// Chain-reported failure string, verbatim, when `success` is false.
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GasCoin {
    pub coin_object_id: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CreatedObject {
    pub object_type: String,
    pub object_id: String,
}

#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub event_type: String,
    pub parsed: Value,
}

/// Readable effects of an executed transaction.
#[derive(Debug, Clone, Default)]
pub struct TxEffects {
    pub created: Vec<CreatedObject>,
    pub events: Vec<ChainEvent>,
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Build transaction bytes (base64) for a Move call.
    async fn build_move_call(&self, req: &MoveCallRequest) -> Result<String>;

    /// Execute a signed transaction and report the chain's verdict.
    async fn execute(&self, tx_bytes_b64: &str, signature_b64: &str) -> Result<ExecuteResult>;

    /// Effects of a transaction, or None while not yet readable.
    async fn transaction_effects(&self, digest: &str) -> Result<Option<TxEffects>>;

    /// Gas coins owned by `owner`, largest-balance first as the node returns
    /// them.
    async fn gas_coins(&self, owner: &str) -> Result<Vec<GasCoin>>;
}

// ---------------------------------------------------------------------------
// JsonRpcChain
// ---------------------------------------------------------------------------

pub struct JsonRpcChain {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl JsonRpcChain {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let envelope: RpcEnvelope = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("rpc transport error calling {method}"))?
            .json()
            .await
            .with_context(|| format!("rpc response to {method} is not JSON"))?;

        if let Some(err) = envelope.error {
            bail!("{} failed: {} (code {})", method, err.message, err.code);
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("{method} returned neither result nor error"))
    }
}

#[async_trait]
impl ChainRpc for JsonRpcChain {
    async fn build_move_call(&self, req: &MoveCallRequest) -> Result<String> {
        let result = self
            .call(
                "unsafe_moveCall",
                json!([
                    req.signer,
                    req.package_object_id,
                    req.module,
                    req.function,
                    req.type_arguments,
                    req.arguments,
                    req.gas,
                    req.gas_budget.to_string(),
                ]),
            )
            .await?;

        result["txBytes"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("unsafe_moveCall result missing txBytes"))
    }

    async fn execute(&self, tx_bytes_b64: &str, signature_b64: &str) -> Result<ExecuteResult> {
        let result = self
            .call(
                "sui_executeTransactionBlock",
                json!([
                    tx_bytes_b64,
                    [signature_b64],
                    { "showEffects": true, "showEvents": true },
                    "WaitForLocalExecution",
                ]),
            )
            .await?;

        let digest = result["digest"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("execute result missing digest"))?;

        let status = &result["effects"]["status"];
        let success = status["status"].as_str() == Some("success");
        let error = status["error"].as_str().map(str::to_string);

        Ok(ExecuteResult {
            digest,
            success,
            error,
        })
    }

    async fn transaction_effects(&self, digest: &str) -> Result<Option<TxEffects>> {
        let result = self
            .call(
                "sui_getTransactionBlock",
                json!([
                    digest,
                    { "showEffects": true, "showEvents": true, "showObjectChanges": true },
                ]),
            )
            .await;

        // A not-yet-indexed digest surfaces as an RPC error; report "not yet
        // readable" and let the caller keep polling.
        let result = match result {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(digest, error = %e, "effects not yet readable");
                return Ok(None);
            }
        };

        if result["effects"].is_null() {
            return Ok(None);
        }

        let created = result["objectChanges"]
            .as_array()
            .map(|changes| {
                changes
                    .iter()
                    .filter(|c| c["type"].as_str() == Some("created"))
                    .filter_map(|c| {
                        Some(CreatedObject {
                            object_type: c["objectType"].as_str()?.to_string(),
                            object_id: c["objectId"].as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let events = result["events"]
            .as_array()
            .map(|events| {
                events
                    .iter()
                    .filter_map(|e| {
                        Some(ChainEvent {
                            event_type: e["type"].as_str()?.to_string(),
                            parsed: e["parsedJson"].clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(TxEffects { created, events }))
    }

    async fn gas_coins(&self, owner: &str) -> Result<Vec<GasCoin>> {
        let result = self
            .call("suix_getCoins", json!([owner, "0x2::sui::SUI"]))
            .await?;

        let coins = result["data"]
            .as_array()
            .map(|data| {
                data.iter()
                    .filter_map(|c| {
                        Some(GasCoin {
                            coin_object_id: c["coinObjectId"].as_str()?.to_string(),
                            balance: c["balance"].as_str()?.parse().ok()?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(coins)
    }
}
