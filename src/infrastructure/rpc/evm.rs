//! Ethereum JSON-RPC reads (`eth_call`, `eth_blockNumber`)

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::transport::JsonRpcTransport;
use crate::shared::errors::RpcError;

/// Read-only EVM access used by lending pools
#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// Endpoint identity, used in cache keys and logs
    fn endpoint(&self) -> &str;

    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Execute a view call against `to` and return the raw return data
    async fn call(&self, to: &str, data: &[u8], block: Option<u64>) -> Result<Vec<u8>, RpcError>;
}

pub struct EvmRpcClient {
    transport: JsonRpcTransport,
}

impl EvmRpcClient {
    pub fn new(transport: JsonRpcTransport) -> Self {
        Self { transport }
    }
}

fn block_tag(block: Option<u64>) -> String {
    match block {
        Some(number) => format!("0x{:x}", number),
        None => "latest".to_string(),
    }
}

pub fn parse_hex_u64(value: &str) -> Result<u64, RpcError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::Malformed(format!("bad quantity {}: {}", value, e)))
}

pub fn parse_hex_bytes(value: &str) -> Result<Vec<u8>, RpcError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| RpcError::Malformed(format!("bad data {}: {}", value, e)))
}

#[async_trait]
impl EvmRpc for EvmRpcClient {
    fn endpoint(&self) -> &str {
        self.transport.url()
    }

    async fn block_number(&self) -> Result<u64, RpcError> {
        let raw: String = self.transport.request("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&raw)
    }

    async fn call(&self, to: &str, data: &[u8], block: Option<u64>) -> Result<Vec<u8>, RpcError> {
        debug!("eth_call {} 0x{}", to, hex::encode(&data[..data.len().min(4)]));
        let raw: String = self
            .transport
            .request(
                "eth_call",
                json!([{ "to": to, "data": format!("0x{}", hex::encode(data)) }, block_tag(block)]),
            )
            .await?;
        parse_hex_bytes(&raw)
    }
}
