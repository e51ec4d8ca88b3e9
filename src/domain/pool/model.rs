//! Closed set of pool variants behind the quoting capability

use async_trait::async_trait;
use std::sync::Arc;

use super::alpha_stake::AlphaStakePool;
use super::lending_pair::LendingPairPool;
use super::YieldSource;
use crate::domain::yield_history::YieldEstimator;
use crate::infrastructure::rpc::Connection;
use crate::shared::errors::{ConfigError, PoolError, QuoteError};
use crate::shared::types::{Amount, PoolDescriptor, PoolType, ProviderType};

/// Chain access handed to pools at initialization
#[derive(Clone)]
pub struct ChainHandle {
    pub connection: Connection,
    /// Shared estimator for every alpha pool on a subtensor connection
    pub estimator: Option<Arc<YieldEstimator>>,
}

impl ChainHandle {
    pub fn evm(connection: Connection) -> Self {
        Self {
            connection,
            estimator: None,
        }
    }

    pub fn subtensor(connection: Connection, estimator: Arc<YieldEstimator>) -> Self {
        Self {
            connection,
            estimator: Some(estimator),
        }
    }
}

pub enum PoolModel {
    LendingPair(LendingPairPool),
    AlphaStake(AlphaStakePool),
}

impl PoolModel {
    /// Build the pool variant a validated descriptor names
    pub fn from_descriptor(
        id: &str,
        descriptor: &PoolDescriptor,
        request_user: &str,
        alpha_lookback_blocks: u64,
    ) -> Result<Self, ConfigError> {
        descriptor.validate()?;
        match descriptor.pool_type {
            PoolType::SturdySilo => Ok(PoolModel::LendingPair(LendingPairPool::new(
                id,
                &descriptor.contract_address,
                descriptor.resolve_user(request_user),
                descriptor.decimals,
            ))),
            PoolType::BtAlpha => {
                let netuid = descriptor.netuid.ok_or_else(|| ConfigError::InvalidPool {
                    address: id.to_string(),
                    reason: "alpha pools require a netuid".to_string(),
                })?;
                Ok(PoolModel::AlphaStake(AlphaStakePool::new(
                    id,
                    &descriptor.contract_address,
                    netuid,
                    descriptor.decimals,
                    alpha_lookback_blocks,
                )))
            }
        }
    }

    pub fn provider(&self) -> ProviderType {
        match self {
            PoolModel::LendingPair(_) => ProviderType::EthereumMainnet,
            PoolModel::AlphaStake(_) => ProviderType::BittensorMainnet,
        }
    }

    /// One-time binding to the chain; must precede `sync`
    pub async fn initialize(&mut self, chain: &ChainHandle) -> Result<(), PoolError> {
        let expected = self.provider();
        match self {
            PoolModel::LendingPair(pool) => pool.initialize(&chain.connection).await,
            PoolModel::AlphaStake(pool) => match &chain.estimator {
                Some(estimator) if chain.connection.provider() == expected => {
                    pool.initialize(Arc::clone(estimator));
                    Ok(())
                }
                _ => Err(PoolError::ConnectionMismatch {
                    address: pool.id().to_string(),
                    expected: expected.to_string(),
                    actual: chain.connection.provider().to_string(),
                }),
            },
        }
    }

    /// Refresh chain state before the first quote of a run
    pub async fn sync(&mut self) -> Result<(), PoolError> {
        match self {
            PoolModel::LendingPair(pool) => pool.sync().await,
            PoolModel::AlphaStake(pool) => pool.sync().await,
        }
    }
}

#[async_trait]
impl YieldSource for PoolModel {
    fn address(&self) -> &str {
        match self {
            PoolModel::LendingPair(pool) => pool.id(),
            PoolModel::AlphaStake(pool) => pool.id(),
        }
    }

    fn decimals(&self) -> u8 {
        match self {
            PoolModel::LendingPair(pool) => pool.decimals(),
            PoolModel::AlphaStake(pool) => pool.decimals(),
        }
    }

    async fn quote(&self, simulated_deposit: Amount, increment: Amount) -> Result<f64, QuoteError> {
        match self {
            PoolModel::LendingPair(pool) => pool.quote(simulated_deposit, increment),
            PoolModel::AlphaStake(pool) => pool.quote(simulated_deposit, increment).await,
        }
    }
}
