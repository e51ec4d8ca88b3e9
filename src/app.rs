// src/app.rs
use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::application::{Cli, CommandExecutor, Commands, ServiceConfig};
use crate::config::Config;
use crate::domain::allocation::OptimizerConfig;
use crate::shared::types::ProviderType;
use crate::shared::utils::RetryPolicy;

#[derive(Debug, Clone)]
pub struct AppCfg {
    pub ethereum_url: Option<String>,
    pub bittensor_url: Option<String>,
    pub allocation_threshold_bps: u32,
    pub increment_divisor: u32,
    pub quote_timeout_ms: u64,
    pub cache_capacity: usize,
    pub rpc_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub alpha_lookback_blocks: u64,
    pub alpha_periods_per_year: f64,
    pub alpha_interval: Option<u64>,
}

impl AppCfg {
    pub fn from_config(cfg: Config) -> Self {
        Self {
            ethereum_url: cfg.providers.ethereum_mainnet,
            bittensor_url: cfg.providers.bittensor_mainnet,
            allocation_threshold_bps: cfg.optimizer.allocation_threshold_bps,
            increment_divisor: cfg.optimizer.increment_divisor,
            quote_timeout_ms: cfg.optimizer.quote_timeout_ms,
            cache_capacity: cfg.cache.capacity,
            rpc_timeout_ms: cfg.rpc.timeout_ms,
            max_retries: cfg.rpc.max_retries,
            backoff_base_ms: cfg.rpc.backoff_base_ms,
            alpha_lookback_blocks: cfg.alpha.lookback_blocks,
            alpha_periods_per_year: cfg.alpha.periods_per_year,
            alpha_interval: cfg.alpha.interval,
        }
    }

    /// CLI args take priority over the config file
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        if let Some(url) = &cli.ethereum_url {
            self.ethereum_url = Some(url.clone());
        }
        if let Some(url) = &cli.bittensor_url {
            self.bittensor_url = Some(url.clone());
        }
        if let Some(bps) = cli.threshold_bps {
            self.allocation_threshold_bps = bps;
        }
        if let Some(divisor) = cli.increment_divisor {
            self.increment_divisor = divisor;
        }
        if let Some(timeout) = cli.quote_timeout_ms {
            self.quote_timeout_ms = timeout;
        }
        if let Some(capacity) = cli.cache_capacity {
            self.cache_capacity = capacity;
        }
        self
    }

    pub fn service_config(&self) -> ServiceConfig {
        let mut endpoints = HashMap::new();
        if let Some(url) = &self.ethereum_url {
            endpoints.insert(ProviderType::EthereumMainnet, url.clone());
        }
        if let Some(url) = &self.bittensor_url {
            endpoints.insert(ProviderType::BittensorMainnet, url.clone());
        }
        ServiceConfig {
            endpoints,
            optimizer: OptimizerConfig {
                allocation_threshold_bps: self.allocation_threshold_bps,
                increment_divisor: self.increment_divisor,
                quote_timeout: Duration::from_millis(self.quote_timeout_ms),
            },
            cache_capacity: self.cache_capacity,
            rpc_timeout: Duration::from_millis(self.rpc_timeout_ms),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.backoff_base_ms),
            },
            alpha_lookback_blocks: self.alpha_lookback_blocks,
            alpha_periods_per_year: self.alpha_periods_per_year,
            alpha_interval: self.alpha_interval,
        }
    }
}

pub async fn run(app_cfg: AppCfg, command: Commands) -> Result<()> {
    info!("Starting pool allocator");
    info!("Configuration: {:?}", app_cfg);

    CommandExecutor::execute(command, app_cfg.service_config()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_overrides_file_values() {
        let cfg = Config::from_toml(
            r#"
            [providers]
            ethereum_mainnet = "https://file.example.org"
            bittensor_mainnet = "wss://subtensor.example.org"

            [optimizer]
            increment_divisor = 4
            allocation_threshold_bps = 9500
            "#,
        )
        .unwrap();
        let cli = Cli::parse_from([
            "poolalloc",
            "--ethereum-url",
            "https://cli.example.org",
            "--increment-divisor",
            "8",
            "allocate",
            "--request",
            "-",
        ]);
        let app_cfg = AppCfg::from_config(cfg).with_cli_overrides(&cli);

        assert_eq!(app_cfg.ethereum_url.as_deref(), Some("https://cli.example.org"));
        assert_eq!(app_cfg.bittensor_url.as_deref(), Some("wss://subtensor.example.org"));
        assert_eq!(app_cfg.increment_divisor, 8);
        assert_eq!(app_cfg.allocation_threshold_bps, 9_500);

        let service = app_cfg.service_config();
        assert_eq!(service.endpoints.len(), 2);
        assert_eq!(service.optimizer.increment_divisor, 8);
        assert_eq!(service.cache_capacity, 512);
    }

    #[test]
    fn test_defaults_have_no_endpoints() {
        let service = AppCfg::from_config(Config::default()).service_config();
        assert!(service.endpoints.is_empty());
        assert!(service.optimizer.validate().is_ok());
    }
}
