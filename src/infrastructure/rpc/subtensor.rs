//! Subtensor reads for subnet stake and dividend data.
//!
//! Block height comes from the standard `chain_getHeader` call. Everything
//! else goes through a JSON gateway in front of the node, not the node's own
//! `subnetInfo_*` runtime RPCs (those return SCALE-encoded bytes). The
//! gateway must serve these methods, with JSON params and results:
//!
//! | method                       | params                       | result                        |
//! |------------------------------|------------------------------|-------------------------------|
//! | `subnet_getDynamicInfo`      | `[netuid, block?]`           | [`DynamicInfo`]               |
//! | `subnet_getMetagraph`        | `[netuid, block]`            | [`Metagraph`]                 |
//! | `subnet_getUidForHotkey`     | `[hotkey, netuid, block]`    | uid or `null`                 |
//! | `delegate_getTake`           | `[hotkey, block]`            | take as a fraction            |
//! | `subnet_getTotalHotkeyAlpha` | `[hotkey, netuid, block]`    | stake in rao                  |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::evm::parse_hex_u64;
use super::transport::JsonRpcTransport;
use crate::shared::errors::RpcError;

/// Subnet epoch parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicInfo {
    pub netuid: u16,
    /// Epoch length in blocks
    pub tempo: u64,
    /// Block of the most recent epoch step
    pub last_step: u64,
}

/// Per-uid alpha dividends of a subnet at one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metagraph {
    pub netuid: u16,
    pub block: u64,
    /// `(hotkey, dividends in alpha)` indexed by uid
    pub alpha_dividends_per_hotkey: Vec<(String, f64)>,
}

impl Metagraph {
    pub fn dividends_for_uid(&self, uid: u16) -> Option<f64> {
        self.alpha_dividends_per_hotkey.get(uid as usize).map(|(_, divs)| *divs)
    }
}

#[async_trait]
pub trait SubtensorRpc: Send + Sync {
    /// Endpoint identity, used in cache keys and logs
    fn endpoint(&self) -> &str;

    async fn current_block(&self) -> Result<u64, RpcError>;

    async fn dynamic_info(&self, netuid: u16, block: Option<u64>) -> Result<DynamicInfo, RpcError>;

    async fn metagraph(&self, netuid: u16, block: u64) -> Result<Metagraph, RpcError>;

    async fn uid_for_hotkey(&self, hotkey: &str, netuid: u16, block: u64) -> Result<Option<u16>, RpcError>;

    /// Validator take as a fraction in `[0, 1]`
    async fn delegate_take(&self, hotkey: &str, block: u64) -> Result<f64, RpcError>;

    /// Total alpha staked on `hotkey`, in rao
    async fn total_hotkey_alpha(&self, hotkey: &str, netuid: u16, block: u64) -> Result<u64, RpcError>;
}

#[derive(Debug, Deserialize)]
struct Header {
    number: String,
}

/// [`SubtensorRpc`] over the gateway contract described in the module docs.
/// Pointed at a bare subtensor node, every call except `current_block` fails
/// with "method not found".
pub struct SubtensorRpcClient {
    transport: JsonRpcTransport,
}

impl SubtensorRpcClient {
    pub fn new(transport: JsonRpcTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SubtensorRpc for SubtensorRpcClient {
    fn endpoint(&self) -> &str {
        self.transport.url()
    }

    async fn current_block(&self) -> Result<u64, RpcError> {
        let header: Header = self.transport.request("chain_getHeader", json!([])).await?;
        parse_hex_u64(&header.number)
    }

    async fn dynamic_info(&self, netuid: u16, block: Option<u64>) -> Result<DynamicInfo, RpcError> {
        self.transport
            .request("subnet_getDynamicInfo", json!([netuid, block]))
            .await
    }

    async fn metagraph(&self, netuid: u16, block: u64) -> Result<Metagraph, RpcError> {
        self.transport
            .request("subnet_getMetagraph", json!([netuid, block]))
            .await
    }

    async fn uid_for_hotkey(&self, hotkey: &str, netuid: u16, block: u64) -> Result<Option<u16>, RpcError> {
        self.transport
            .request("subnet_getUidForHotkey", json!([hotkey, netuid, block]))
            .await
    }

    async fn delegate_take(&self, hotkey: &str, block: u64) -> Result<f64, RpcError> {
        let take: f64 = self
            .transport
            .request("delegate_getTake", json!([hotkey, block]))
            .await?;
        if !(0.0..=1.0).contains(&take) {
            return Err(RpcError::Malformed(format!("delegate take {} out of range", take)));
        }
        Ok(take)
    }

    async fn total_hotkey_alpha(&self, hotkey: &str, netuid: u16, block: u64) -> Result<u64, RpcError> {
        self.transport
            .request("subnet_getTotalHotkeyAlpha", json!([hotkey, netuid, block]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::utils::RetryPolicy;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOTKEY: &str = "5F4tQyWrhfGVcNhoqeiNsR6KjD4wMZ2kfhLj4oHYuyHbZAc3";

    async fn mock_result(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc_method })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": result
            })))
            .mount(server)
            .await;
    }

    fn client(url: String) -> SubtensorRpcClient {
        SubtensorRpcClient::new(JsonRpcTransport::new(url, Duration::from_secs(5), RetryPolicy::default()).unwrap())
    }

    #[tokio::test]
    async fn test_current_block_from_header() {
        let server = MockServer::start().await;
        mock_result(&server, "chain_getHeader", json!({ "number": "0x4c4b40", "parentHash": "0x00" })).await;
        assert_eq!(client(server.uri()).current_block().await.unwrap(), 5_000_000);
    }

    #[tokio::test]
    async fn test_metagraph_and_uid() {
        let server = MockServer::start().await;
        mock_result(
            &server,
            "subnet_getMetagraph",
            json!({
                "netuid": 18,
                "block": 5_000_000,
                "alpha_dividends_per_hotkey": [[HOTKEY, 1.25], ["5Other", 0.5]]
            }),
        )
        .await;
        mock_result(&server, "subnet_getUidForHotkey", json!(0)).await;

        let rpc = client(server.uri());
        let metagraph = rpc.metagraph(18, 5_000_000).await.unwrap();
        let uid = rpc.uid_for_hotkey(HOTKEY, 18, 5_000_000).await.unwrap();
        assert_eq!(uid, Some(0));
        assert_eq!(metagraph.dividends_for_uid(0), Some(1.25));
        assert_eq!(metagraph.dividends_for_uid(7), None);
    }

    #[tokio::test]
    async fn test_unregistered_hotkey_has_no_uid() {
        let server = MockServer::start().await;
        mock_result(&server, "subnet_getUidForHotkey", serde_json::Value::Null).await;
        assert_eq!(client(server.uri()).uid_for_hotkey(HOTKEY, 18, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delegate_take_out_of_range() {
        let server = MockServer::start().await;
        mock_result(&server, "delegate_getTake", json!(1.5)).await;
        assert!(client(server.uri()).delegate_take(HOTKEY, 1).await.is_err());
    }
}
