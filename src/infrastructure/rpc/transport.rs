//! JSON-RPC 2.0 over HTTP

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::shared::errors::RpcError;
use crate::shared::utils::{retry_with_backoff_if, RetryPolicy};

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    /// `null` both when absent and when the call legitimately returns nothing
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// HTTP transport shared by the chain clients
pub struct JsonRpcTransport {
    http_client: Client,
    url: String,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self, RpcError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url: url.into(),
            retry,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method`, retrying transient failures with backoff
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        retry_with_backoff_if(
            self.retry,
            method,
            || self.send_once(method, params.clone()),
            RpcError::is_retryable,
        )
        .await
    }

    async fn send_once<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("-> {} #{} {}", self.url, id, method);

        let response = self.http_client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(RpcError::Status(response.status().as_u16()));
        }

        let envelope: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;
        if let Some(error) = envelope.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(envelope.result).map_err(|e| RpcError::Malformed(format!("{}: {}", method, e)))
    }
}
