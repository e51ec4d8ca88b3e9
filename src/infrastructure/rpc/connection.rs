use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::evm::{EvmRpc, EvmRpcClient};
use super::subtensor::{SubtensorRpc, SubtensorRpcClient};
use super::transport::JsonRpcTransport;
use crate::shared::errors::{AppError, ConfigError};
use crate::shared::types::ProviderType;
use crate::shared::utils::RetryPolicy;

/// Initialized handle to one chain
#[derive(Clone)]
pub enum Connection {
    Evm(Arc<dyn EvmRpc>),
    Subtensor(Arc<dyn SubtensorRpc>),
}

impl Connection {
    pub fn provider(&self) -> ProviderType {
        match self {
            Connection::Evm(_) => ProviderType::EthereumMainnet,
            Connection::Subtensor(_) => ProviderType::BittensorMainnet,
        }
    }

    /// Identity of the underlying endpoint
    pub fn id(&self) -> &str {
        match self {
            Connection::Evm(rpc) => rpc.endpoint(),
            Connection::Subtensor(rpc) => rpc.endpoint(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({}, {})", self.provider(), self.id())
    }
}

/// Factory for creating chain connections
pub struct ConnectionFactory {
    timeout: Duration,
    retry: RetryPolicy,
}

impl ConnectionFactory {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self { timeout, retry }
    }

    /// Connect by provider tag, e.g. `"ETHEREUM_MAINNET"`. Unknown tags are
    /// rejected before any network traffic.
    pub async fn connect_tag(&self, tag: &str, url: &str) -> Result<Connection, AppError> {
        let provider: ProviderType = tag.parse()?;
        self.connect(provider, url).await
    }

    pub async fn connect(&self, provider: ProviderType, url: &str) -> Result<Connection, AppError> {
        if url.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint(provider.to_string()).into());
        }
        let transport = JsonRpcTransport::new(url, self.timeout, self.retry)?;
        match provider {
            ProviderType::EthereumMainnet => {
                info!("Connecting to {} at {}", provider, url);
                Ok(Connection::Evm(Arc::new(EvmRpcClient::new(transport))))
            }
            ProviderType::BittensorMainnet => {
                let client = SubtensorRpcClient::new(transport);
                let head = client.current_block().await?;
                info!("Connected to {} at {} (head block {})", provider, url, head);
                Ok(Connection::Subtensor(Arc::new(client)))
            }
        }
    }
}
