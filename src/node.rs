//! JSON-RPC client to the SERO node.
//!
//! Thin facade over the `sero_*` / `exchange_*` / `net_*` wire methods.
//! Requests are JSON-RPC 2.0 over HTTP POST with `id=0`. A rolling health
//! model tracks consecutive failures: five in a row flip the client sick,
//! five consecutive successful checks flip it back.
//!
//! The `exchange_*` family wants `0x`-hex account encodings; everything else
//! takes base58 as-is. The conversion happens here and nowhere else.

use async_trait::async_trait;
use num_bigint::BigUint;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::address;
use crate::constants::{depth, CURRENCY};
use crate::error::{PoolError, RpcError};
use crate::units;

const RECEIPT_STATUS_SUCCESSFUL: &str = "0x1";
const SICK_THRESHOLD: u32 = 5;

/// Full block as returned by `sero_getBlockByNumber(.., true)`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockReply {
    pub number: String,
    pub hash: String,
    pub nonce: String,
    pub miner: String,
    pub difficulty: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub transactions: Vec<TxReply>,
    pub uncles: Vec<String>,
    /// Parity-style engine seal; index 1 carries the nonce when present.
    pub seal_fields: Vec<String>,
}

/// The pending-tip subset of a block, enough to derive the current height.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BlockTip {
    pub number: String,
    pub difficulty: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TxReply {
    pub gas: String,
    pub gas_price: String,
    pub hash: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TxReceipt {
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    pub block_number: String,
    pub block_hash: String,
    pub gas_used: String,
    pub status: String,
}

impl TxReceipt {
    /// Mined into some block.
    pub fn confirmed(&self) -> bool {
        !self.block_hash.is_empty()
    }

    /// Executed without revert. Pre-Byzantium receipts carry no status and
    /// count as successful.
    pub fn successful(&self) -> bool {
        self.status.is_empty() || self.status == RECEIPT_STATUS_SUCCESSFUL
    }
}

/// Sync state of the pool's account as seen by `exchange_getPkSynced`.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PkSynced {
    #[serde(rename = "confirmedBlock")]
    pub confirm_block: u64,
    #[serde(rename = "currentBlock")]
    pub current_block: u64,
    #[serde(rename = "highestBlock")]
    pub highest_block: u64,
    #[serde(rename = "currentPKBlock")]
    pub pk_block: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    id: Option<Value>,
    result: Option<Value>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    #[allow(dead_code)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BalanceReply {
    #[serde(default)]
    tkn: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct GenTxReply {
    #[serde(rename = "Hash")]
    hash: String,
}

/// The node surface the unlocker and the payer run against. `NodeClient` is
/// the production implementation; tests substitute scripted nodes.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_work(&self) -> Result<Vec<String>, RpcError>;
    async fn get_block_number(&self) -> Result<u64, RpcError>;
    async fn get_pending_block(&self) -> Result<Option<BlockTip>, RpcError>;
    async fn get_block_by_height(&self, height: u64) -> Result<Option<BlockReply>, RpcError>;
    async fn get_block_by_hash(&self, hash: &str) -> Result<Option<BlockReply>, RpcError>;
    async fn get_uncle_by_block_number_and_index(
        &self,
        height: u64,
        index: u64,
    ) -> Result<Option<BlockReply>, RpcError>;
    async fn get_tx_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError>;
    async fn submit_block(&self, params: &[String]) -> Result<bool, RpcError>;
    async fn get_balance(&self, address: &str) -> Result<BigUint, RpcError>;
    async fn address_unlocked(&self, address: &str) -> Result<bool, RpcError>;
    async fn get_peer_count(&self) -> Result<u64, RpcError>;
    async fn send_transaction(
        &self,
        from: &str,
        to: &str,
        gas: &str,
        gas_price: &str,
        value: &str,
        auto_gas: bool,
    ) -> Result<String, RpcError>;
    async fn get_max_available(&self, address: &str) -> Result<BigUint, RpcError>;
    async fn clear_exchange(&self, address: &str) -> Result<(), RpcError>;
    /// Exchange-mode phase 1: sign a multi-recipient transaction without
    /// broadcasting. Returns the raw payload for `commit_tx` plus its hash.
    async fn gen_tx_with_sign(
        &self,
        from: &str,
        gas: u64,
        gas_price: u64,
        pays: &[(String, BigUint)],
    ) -> Result<(Value, String), RpcError>;
    /// Exchange-mode phase 2: broadcast a previously generated payload.
    async fn commit_tx(&self, raw: &Value, tx_hash: &str) -> Result<(), RpcError>;
    async fn get_pk_synced(&self, address: &str) -> Result<PkSynced, RpcError>;

    /// Whether the account can transact right now: fully synced, the balance
    /// view past `last_tx_block`, and the confirmation window elapsed.
    async fn can_tx(&self, address: &str, last_tx_block: u64) -> Result<(), PoolError> {
        let sync = self.get_pk_synced(address).await?;
        if sync.current_block != sync.highest_block
            || sync.confirm_block + sync.pk_block + depth::PK_LAG_LIMIT < sync.current_block
        {
            return Err(PoolError::Consistency("account is syncing".into()));
        }
        if sync.current_block <= last_tx_block + sync.confirm_block {
            return Err(PoolError::Consistency("account is confirming".into()));
        }
        if sync.pk_block <= last_tx_block {
            return Err(PoolError::Consistency("account balance is confirming".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Health {
    sick: bool,
    sick_rate: u32,
    success_rate: u32,
}

pub struct NodeClient {
    name: String,
    url: String,
    client: reqwest::Client,
    health: RwLock<Health>,
}

impl NodeClient {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self, PoolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PoolError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            client,
            health: RwLock::new(Health::default()),
        })
    }

    /// Issues a cheap work-template call and reports liveness.
    pub async fn check(&self) -> bool {
        if self.get_work().await.is_err() {
            return false;
        }
        self.mark_alive();
        !self.sick()
    }

    pub fn sick(&self) -> bool {
        self.health.read().sick
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn mark_sick(&self) {
        let mut h = self.health.write();
        h.sick_rate += 1;
        h.success_rate = 0;
        if h.sick_rate >= SICK_THRESHOLD {
            h.sick = true;
        }
    }

    fn mark_alive(&self) {
        let mut h = self.health.write();
        h.success_rate += 1;
        if h.success_rate >= SICK_THRESHOLD {
            h.sick = false;
            h.sick_rate = 0;
            h.success_rate = 0;
        }
    }

    async fn post(&self, method: &str, params: Value) -> Result<Option<Value>, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 0,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.mark_sick();
                RpcError::Transport(format!("{method}: {e}"))
            })?;

        let parsed: JsonRpcResponse = response.json().await.map_err(|e| {
            self.mark_sick();
            RpcError::Transport(format!("{method}: undecodable response: {e}"))
        })?;

        if let Some(err) = parsed.error {
            self.mark_sick();
            return Err(RpcError::Node(format!("{method}: {}", err.message)));
        }
        Ok(parsed.result)
    }

    async fn post_expecting(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.post(method, params)
            .await?
            .ok_or_else(|| RpcError::Transport(format!("{method}: empty result")))
    }

    async fn get_block(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<BlockReply>, RpcError> {
        match self.post(method, params).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| RpcError::Transport(format!("{method}: bad block body: {e}"))),
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
        serde_json::from_value(value)
            .map_err(|e| RpcError::Transport(format!("{method}: bad result body: {e}")))
    }

    fn hex_address(address: &str) -> Result<String, RpcError> {
        address::base58_to_hex(address)
            .map_err(|e| RpcError::Transport(format!("unencodable address {address:?}: {e}")))
    }

    /// Large numeric results arrive as decimal JSON literals; quantities as
    /// `0x` strings. Both decode to an exact integer.
    fn decode_big(method: &str, value: &Value) -> Result<BigUint, RpcError> {
        let text = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            other => {
                return Err(RpcError::Transport(format!(
                    "{method}: expected numeric result, got {other}"
                )))
            }
        };
        let parsed = if let Some(hex) = text.strip_prefix("0x") {
            BigUint::parse_bytes(hex.as_bytes(), 16)
        } else {
            BigUint::parse_bytes(text.as_bytes(), 10)
        };
        parsed.ok_or_else(|| RpcError::Transport(format!("{method}: bad quantity {text:?}")))
    }
}

#[async_trait]
impl NodeRpc for NodeClient {
    async fn get_work(&self) -> Result<Vec<String>, RpcError> {
        let result = self.post_expecting("sero_getWork", json!([])).await?;
        Self::decode("sero_getWork", result)
    }

    async fn get_block_number(&self) -> Result<u64, RpcError> {
        let result = self.post_expecting("sero_blockNumber", Value::Null).await?;
        let text: String = Self::decode("sero_blockNumber", result)?;
        units::parse_hex_u64(&text)
            .map_err(|e| RpcError::Transport(format!("sero_blockNumber: {e}")))
    }

    async fn get_pending_block(&self) -> Result<Option<BlockTip>, RpcError> {
        match self
            .post("sero_getBlockByNumber", json!(["pending", false]))
            .await?
        {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Self::decode("sero_getBlockByNumber", value).map(Some),
        }
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Option<BlockReply>, RpcError> {
        self.get_block(
            "sero_getBlockByNumber",
            json!([format!("0x{height:x}"), true]),
        )
        .await
    }

    async fn get_block_by_hash(&self, hash: &str) -> Result<Option<BlockReply>, RpcError> {
        self.get_block("sero_getBlockByHash", json!([hash, true])).await
    }

    async fn get_uncle_by_block_number_and_index(
        &self,
        height: u64,
        index: u64,
    ) -> Result<Option<BlockReply>, RpcError> {
        self.get_block(
            "sero_getUncleByBlockNumberAndIndex",
            json!([format!("0x{height:x}"), format!("0x{index:x}")]),
        )
        .await
    }

    async fn get_tx_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        match self
            .post("sero_getTransactionReceipt", json!([hash]))
            .await?
        {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Self::decode("sero_getTransactionReceipt", value).map(Some),
        }
    }

    async fn submit_block(&self, params: &[String]) -> Result<bool, RpcError> {
        let result = self.post_expecting("sero_submitWork", json!(params)).await?;
        Self::decode("sero_submitWork", result)
    }

    async fn get_balance(&self, address: &str) -> Result<BigUint, RpcError> {
        let result = self
            .post_expecting("sero_getBalance", json!([address, "latest"]))
            .await?;
        let reply: BalanceReply = Self::decode("sero_getBalance", result)?;
        match reply.tkn.get(CURRENCY) {
            Some(quantity) => units::parse_hex_big(quantity)
                .map_err(|e| RpcError::Transport(format!("sero_getBalance: {e}"))),
            None => Ok(BigUint::from(0u8)),
        }
    }

    async fn address_unlocked(&self, address: &str) -> Result<bool, RpcError> {
        let result = self
            .post_expecting("sero_addressUnlocked", json!([address]))
            .await?;
        Self::decode("sero_addressUnlocked", result)
    }

    async fn get_peer_count(&self) -> Result<u64, RpcError> {
        let result = self.post_expecting("net_peerCount", Value::Null).await?;
        let text: String = Self::decode("net_peerCount", result)?;
        units::parse_hex_u64(&text).map_err(|e| RpcError::Transport(format!("net_peerCount: {e}")))
    }

    async fn send_transaction(
        &self,
        from: &str,
        to: &str,
        gas: &str,
        gas_price: &str,
        value: &str,
        auto_gas: bool,
    ) -> Result<String, RpcError> {
        let mut params = serde_json::Map::new();
        params.insert("from".into(), json!(from));
        params.insert("to".into(), json!(to));
        params.insert("value".into(), json!(value));
        if !auto_gas {
            params.insert("gas".into(), json!(gas));
            params.insert("gasPrice".into(), json!(gas_price));
        }
        let result = self
            .post_expecting("sero_sendTransaction", json!([params]))
            .await?;
        let tx_hash: String = Self::decode("sero_sendTransaction", result)?;

        // Some nodes answer a zero hash instead of an error when the signer
        // cannot produce the transaction yet.
        if units::is_zero_hash(&tx_hash) {
            return Err(RpcError::NotYetAvailable);
        }
        Ok(tx_hash)
    }

    async fn get_max_available(&self, address: &str) -> Result<BigUint, RpcError> {
        let hex_address = Self::hex_address(address)?;
        let result = self
            .post_expecting("exchange_getMaxAvailable", json!([hex_address, CURRENCY]))
            .await?;
        Self::decode_big("exchange_getMaxAvailable", &result)
    }

    async fn clear_exchange(&self, address: &str) -> Result<(), RpcError> {
        let hex_address = Self::hex_address(address)?;
        self.post("exchange_clearUsedFlag", json!([hex_address]))
            .await?;
        Ok(())
    }

    async fn gen_tx_with_sign(
        &self,
        from: &str,
        gas: u64,
        gas_price: u64,
        pays: &[(String, BigUint)],
    ) -> Result<(Value, String), RpcError> {
        let receptions = pays
            .iter()
            .map(|(addr, value)| {
                Ok(json!({
                    "Addr": Self::hex_address(addr)?,
                    "Currency": CURRENCY,
                    "Value": value.to_str_radix(10),
                }))
            })
            .collect::<Result<Vec<_>, RpcError>>()?;
        let args = json!({
            "From": Self::hex_address(from)?,
            "Receptions": receptions,
            "Gas": gas,
            "GasPrice": gas_price,
            "Roots": [],
        });
        let result = self
            .post_expecting("exchange_genTxWithSign", json!([args]))
            .await?;
        let reply: GenTxReply = Self::decode("exchange_genTxWithSign", result.clone())?;
        Ok((result, reply.hash))
    }

    async fn commit_tx(&self, raw: &Value, _tx_hash: &str) -> Result<(), RpcError> {
        self.post("exchange_commitTx", json!([raw])).await?;
        Ok(())
    }

    async fn get_pk_synced(&self, address: &str) -> Result<PkSynced, RpcError> {
        let hex_address = Self::hex_address(address)?;
        let result = self
            .post_expecting("exchange_getPkSynced", json!([hex_address]))
            .await?;
        Self::decode("exchange_getPkSynced", result)
    }
}
