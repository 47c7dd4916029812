use crate::error::{JackpotError, Result};
use crate::types::{Address, TxReceipt, Wei};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    pub id: Value,
    pub result: Option<Value>,
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// Ethereum JSON-RPC over HTTP.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        tracing::trace!("RPC {} -> {}", method, self.url);

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| JackpotError::rpc(format!("{} request failed: {}", method, e)))?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(if err.code == 3 || err.message.contains("revert") {
                JackpotError::contract(err.message)
            } else {
                JackpotError::rpc(format!("{} ({})", err.message, err.code))
            });
        }

        let result = response.result.unwrap_or(Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let raw: String = self.request("eth_chainId", json!([])).await?;
        quantity_u64(&raw)
    }

    pub async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let raw: String = self
            .request(
                "eth_call",
                json!([{ "to": to.to_string(), "data": hex_data(data) }, "latest"]),
            )
            .await?;
        decode_hex_data(&raw)
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let raw: String = self.request("eth_gasPrice", json!([])).await?;
        quantity(&raw)
    }

    pub async fn transaction_count(&self, address: &Address) -> Result<u64> {
        let raw: String = self
            .request(
                "eth_getTransactionCount",
                json!([address.to_string(), "pending"]),
            )
            .await?;
        quantity_u64(&raw)
    }

    pub async fn estimate_gas(
        &self,
        from: &Address,
        to: &Address,
        value: Wei,
        data: &[u8],
    ) -> Result<u64> {
        let raw: String = self
            .request(
                "eth_estimateGas",
                json!([{
                    "from": from.to_string(),
                    "to": to.to_string(),
                    "value": format!("0x{:x}", value.as_wei()),
                    "data": hex_data(data),
                }]),
            )
            .await?;
        quantity_u64(&raw)
    }

    pub async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<String> {
        self.request("eth_sendRawTransaction", json!([hex_data(raw_tx)]))
            .await
    }

    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>> {
        let receipt: Option<Value> = self
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };

        let field = |name: &str| receipt.get(name).and_then(Value::as_str);

        let block_number = field("blockNumber").map(quantity_u64).transpose()?;
        let Some(block_number) = block_number else {
            // still pending on some nodes
            return Ok(None);
        };

        let success = match field("status") {
            Some(status) => quantity(status)? == 1,
            None => true,
        };

        Ok(Some(TxReceipt {
            tx_hash: tx_hash.to_string(),
            block_number,
            success,
        }))
    }
}

pub fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_hex_data(raw: &str) -> Result<Vec<u8>> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(stripped).map_err(|e| JackpotError::rpc(format!("Invalid hex data: {}", e)))
}

/// Parse a `0x`-prefixed JSON-RPC quantity.
pub fn quantity(raw: &str) -> Result<u128> {
    let stripped = raw
        .strip_prefix("0x")
        .ok_or_else(|| JackpotError::rpc(format!("Quantity missing 0x prefix: {}", raw)))?;
    if stripped.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(stripped, 16)
        .map_err(|e| JackpotError::rpc(format!("Invalid quantity {}: {}", raw, e)))
}

pub fn quantity_u64(raw: &str) -> Result<u64> {
    u64::try_from(quantity(raw)?)
        .map_err(|_| JackpotError::rpc(format!("Quantity {} exceeds 64 bits", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quantities() {
        assert_eq!(quantity("0x0").unwrap(), 0);
        assert_eq!(quantity("0x40d9").unwrap(), 16601);
        assert_eq!(quantity_u64("0x1").unwrap(), 1);
        assert!(quantity("10").is_err());
        assert!(quantity("0xzz").is_err());
    }

    #[test]
    fn hex_data_roundtrip() {
        let data = vec![0xde, 0xad, 0xbe, 0xef];
        let encoded = hex_data(&data);
        assert_eq!(encoded, "0xdeadbeef");
        assert_eq!(decode_hex_data(&encoded).unwrap(), data);
        assert_eq!(decode_hex_data("0x").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn request_serializes_as_jsonrpc() {
        let req = RpcRequest::new(7, "eth_chainId", json!([]));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "eth_chainId");
    }
}
