//! Application services and use cases

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::report::AllocationReport;
use crate::domain::allocation::{AllocationOptimizer, OptimizerConfig};
use crate::domain::pool::{ChainHandle, PoolModel, DEFAULT_LOOKBACK_BLOCKS};
use crate::domain::yield_history::{AlphaQueries, ApyQuery, YieldEstimator, DEFAULT_PERIODS_PER_YEAR};
use crate::infrastructure::cache::DEFAULT_CACHE_CAPACITY;
use crate::infrastructure::rpc::{Connection, ConnectionFactory};
use crate::shared::errors::{AppError, ConfigError};
use crate::shared::types::{AllocationRequest, ProviderType};
use crate::shared::utils::RetryPolicy;

/// Everything a service needs to reach the chains and run the optimizer
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub endpoints: HashMap<ProviderType, String>,
    pub optimizer: OptimizerConfig,
    pub cache_capacity: usize,
    pub rpc_timeout: Duration,
    pub retry: RetryPolicy,
    pub alpha_lookback_blocks: u64,
    pub alpha_periods_per_year: f64,
    /// Defaults to the subnet tempo
    pub alpha_interval: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            optimizer: OptimizerConfig::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            rpc_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            alpha_lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            alpha_periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            alpha_interval: None,
        }
    }
}

/// Application service for allocation runs
pub struct AllocationService {
    config: ServiceConfig,
    factory: ConnectionFactory,
    /// Pre-established connections, used instead of dialing the endpoint
    connections: HashMap<ProviderType, Connection>,
}

impl AllocationService {
    pub fn new(config: ServiceConfig) -> Self {
        let factory = ConnectionFactory::new(config.rpc_timeout, config.retry);
        Self {
            config,
            factory,
            connections: HashMap::new(),
        }
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.insert(connection.provider(), connection);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run one allocation request end to end.
    ///
    /// Configuration problems are reported before any network call. Pools that
    /// fail to initialize or sync stay in the run and are simply never quoted.
    pub async fn allocate(&self, request: &AllocationRequest) -> Result<AllocationReport, AppError> {
        let pools = &request.assets_and_pools.pools;
        if pools.is_empty() {
            return Err(ConfigError::EmptyPoolSet.into());
        }
        if request.min_active_pools == 0 {
            return Err(ConfigError::InvalidMinActivePools.into());
        }
        self.config.optimizer.validate()?;

        let mut models = pools
            .iter()
            .map(|(id, descriptor)| {
                PoolModel::from_descriptor(
                    id,
                    descriptor,
                    &request.user_address,
                    self.config.alpha_lookback_blocks,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut providers: Vec<ProviderType> = Vec::new();
        for model in &models {
            if !providers.contains(&model.provider()) {
                providers.push(model.provider());
            }
        }
        for provider in &providers {
            if !self.connections.contains_key(provider) && !self.config.endpoints.contains_key(provider) {
                return Err(ConfigError::MissingEndpoint(provider.to_string()).into());
            }
        }

        info!(
            "Allocation request for {}: {} pools, {} total assets, {} min active",
            request.user_address,
            models.len(),
            request.assets_and_pools.total_assets,
            request.min_active_pools
        );

        let mut chains = HashMap::new();
        for provider in providers {
            let chain = self.chain(provider).await?;
            chains.insert(provider, chain);
        }

        let setups = join_all(models.iter_mut().map(|model| {
            let chain = chains.get(&model.provider()).cloned();
            async move {
                let Some(chain) = chain else {
                    return false;
                };
                let setup = match model.initialize(&chain).await {
                    Ok(()) => model.sync().await,
                    Err(e) => Err(e),
                };
                match setup {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Pool setup failed, it will not be quoted: {}", e);
                        false
                    }
                }
            }
        }))
        .await;
        let ready = setups.iter().filter(|ok| **ok).count();
        info!("{} of {} pools ready", ready, models.len());

        let optimizer = AllocationOptimizer::new(self.config.optimizer.clone());
        let outcome = optimizer
            .optimize(request.assets_and_pools.total_assets, &models, request.min_active_pools)
            .await?;

        for chain in chains.values() {
            if let Some(estimator) = &chain.estimator {
                estimator.queries().log_stats();
            }
        }

        outcome.check_invariants(request.min_active_pools)?;

        Ok(AllocationReport::new(
            outcome,
            &request.user_address,
            request.request_type.clone(),
        ))
    }

    /// Trailing alpha yield for one hotkey
    pub async fn estimate_apy(&self, query: &ApyQuery) -> Result<f64, AppError> {
        let chain = self.chain(ProviderType::BittensorMainnet).await?;
        let estimator = chain
            .estimator
            .ok_or_else(|| AppError::Unknown("subtensor connection without estimator".to_string()))?;
        let apy = estimator.average_apy(query).await;
        estimator.queries().log_stats();
        Ok(apy)
    }

    async fn connection(&self, provider: ProviderType) -> Result<Connection, AppError> {
        if let Some(connection) = self.connections.get(&provider) {
            return Ok(connection.clone());
        }
        let url = self
            .config
            .endpoints
            .get(&provider)
            .ok_or_else(|| ConfigError::MissingEndpoint(provider.to_string()))?;
        self.factory.connect(provider, url).await
    }

    async fn chain(&self, provider: ProviderType) -> Result<ChainHandle, AppError> {
        let connection = self.connection(provider).await?;
        match &connection {
            Connection::Evm(_) => Ok(ChainHandle::evm(connection)),
            Connection::Subtensor(rpc) => {
                let queries = AlphaQueries::new(Arc::clone(rpc), self.config.cache_capacity);
                let estimator = Arc::new(YieldEstimator::new(
                    queries,
                    self.config.alpha_periods_per_year,
                    self.config.alpha_interval,
                ));
                Ok(ChainHandle::subtensor(connection.clone(), estimator))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pool::fake_evm::{FakeEvm, PAIR, USER};
    use crate::domain::yield_history::testing::FakeSubtensor;
    use crate::shared::types::{AssetsAndPools, PoolDescriptor, PoolModelKind, PoolSet, PoolType};

    const SECOND_PAIR: &str = "0x200723063111f9f8f1d44c0f30afadf0c0b1a04b";
    const HOTKEY: &str = "5F4tQyWrhfGVcNhoqeiNsR6KjD4wMZ2kfhLj4oHYuyHbZAc3";

    fn silo(address: &str) -> PoolDescriptor {
        PoolDescriptor {
            model: PoolModelKind::EvmChainBased,
            pool_type: PoolType::SturdySilo,
            contract_address: address.to_string(),
            provider: ProviderType::EthereumMainnet,
            user_address: None,
            netuid: None,
            decimals: None,
        }
    }

    fn alpha() -> PoolDescriptor {
        PoolDescriptor {
            model: PoolModelKind::Bittensor,
            pool_type: PoolType::BtAlpha,
            contract_address: HOTKEY.to_string(),
            provider: ProviderType::BittensorMainnet,
            user_address: None,
            netuid: Some(18),
            decimals: None,
        }
    }

    fn request(pools: Vec<(&str, PoolDescriptor)>, total_assets: u128, min_active: usize) -> AllocationRequest {
        AllocationRequest {
            min_active_pools: min_active,
            request_type: Some("ORGANIC".to_string()),
            user_address: USER.to_string(),
            assets_and_pools: AssetsAndPools {
                total_assets,
                pools: PoolSet::new(pools.into_iter().map(|(id, d)| (id.to_string(), d)).collect()),
            },
        }
    }

    fn evm_service() -> AllocationService {
        AllocationService::new(ServiceConfig::default())
            .with_connection(Connection::Evm(Arc::new(FakeEvm::silo(6, 0))))
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_before_connecting() {
        let service = AllocationService::new(ServiceConfig::default());
        let err = service
            .allocate(&request(vec![(PAIR, silo(PAIR))], 1_000, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ConfigError::MissingEndpoint(_))));
    }

    #[tokio::test]
    async fn test_empty_pool_set_is_rejected() {
        let err = evm_service().allocate(&request(vec![], 1_000, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ConfigError::EmptyPoolSet)));
    }

    #[tokio::test]
    async fn test_invalid_descriptor_is_rejected() {
        let err = evm_service()
            .allocate(&request(vec![("bad", silo("0x1234"))], 1_000, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ConfigError::InvalidPool { .. })));
    }

    #[tokio::test]
    async fn test_allocates_to_synced_pool_and_floors_unreachable_one() {
        let unit = 10u128.pow(18);
        // the fake only answers for PAIR, so the second pair never syncs
        let report = evm_service()
            .allocate(&request(vec![(PAIR, silo(PAIR)), (SECOND_PAIR, silo(SECOND_PAIR))], 300 * unit, 2))
            .await
            .unwrap();

        let amounts: Vec<u128> = report.allocations.iter().map(|a| a.amount).collect();
        let step = 100 * unit;
        assert_eq!(amounts, vec![300 * unit - step / 100, step / 100]);
        assert_eq!(report.rounds, 3);
        assert!(!report.incomplete);
        assert_eq!(report.total_allocated, 300 * unit);
        assert_eq!(report.user_address, USER);
    }

    #[tokio::test]
    async fn test_alpha_and_lending_pools_share_a_run() {
        let unit = 10u128.pow(18);
        let subtensor = Arc::new(FakeSubtensor::new(10_000, 360, 10_000));
        subtensor.set_dividends(HOTKEY, 0.0001, 0.18);
        subtensor.set_stake_rao(HOTKEY, 50_000_000_000);
        let config = ServiceConfig {
            alpha_lookback_blocks: 3_600,
            ..Default::default()
        };
        let service = AllocationService::new(config)
            .with_connection(Connection::Evm(Arc::new(FakeEvm::silo(6, 0))))
            .with_connection(Connection::Subtensor(subtensor.clone()));

        let report = service
            .allocate(&request(vec![(PAIR, silo(PAIR)), ("alpha", alpha())], 30 * unit, 2))
            .await
            .unwrap();

        assert_eq!(report.allocations.len(), 2);
        assert_eq!(report.allocations.iter().filter(|a| a.amount > 0).count(), 2);
        assert!(report.total_allocated <= 30 * unit);
        // every round quotes the same blocks, so the metagraph is fetched once per block
        assert_eq!(subtensor.calls("metagraph"), 10);
    }

    #[tokio::test]
    async fn test_estimate_apy_uses_subtensor_connection() {
        let subtensor = Arc::new(FakeSubtensor::new(1_000, 100, 1_000));
        subtensor.set_dividends(HOTKEY, 0.001, 0.0);
        subtensor.set_stake_rao(HOTKEY, 1_000_000_000);
        let service =
            AllocationService::new(ServiceConfig::default()).with_connection(Connection::Subtensor(subtensor));

        let apy = service
            .estimate_apy(&ApyQuery {
                hotkey: HOTKEY.to_string(),
                netuid: 18,
                start_block: 700,
                end_block: Some(1_000),
                interval: None,
                delta_alpha: 0.0,
            })
            .await
            .unwrap();
        assert!(apy > 0.0);
    }
}
