use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::domain::allocation::{DEFAULT_INCREMENT_DIVISOR, DEFAULT_QUOTE_TIMEOUT, DEFAULT_THRESHOLD_BPS};
use crate::domain::pool::DEFAULT_LOOKBACK_BLOCKS;
use crate::domain::yield_history::DEFAULT_PERIODS_PER_YEAR;
use crate::infrastructure::cache::DEFAULT_CACHE_CAPACITY;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersCfg {
    pub ethereum_mainnet: Option<String>,
    pub bittensor_mainnet: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerCfg {
    pub allocation_threshold_bps: u32,
    pub increment_divisor: u32,
    pub quote_timeout_ms: u64,
}

impl Default for OptimizerCfg {
    fn default() -> Self {
        Self {
            allocation_threshold_bps: DEFAULT_THRESHOLD_BPS,
            increment_divisor: DEFAULT_INCREMENT_DIVISOR,
            quote_timeout_ms: DEFAULT_QUOTE_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheCfg {
    pub capacity: usize,
}

impl Default for CacheCfg {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcCfg {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RpcCfg {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlphaCfg {
    pub lookback_blocks: u64,
    pub periods_per_year: f64,
    /// Bucket size in blocks; the subnet tempo when unset
    pub interval: Option<u64>,
}

impl Default for AlphaCfg {
    fn default() -> Self {
        Self {
            lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            interval: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub providers: ProvidersCfg,
    pub optimizer: OptimizerCfg,
    pub cache: CacheCfg,
    pub rpc: RpcCfg,
    pub alpha: AlphaCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read config {}", path.as_ref().display()))?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).context("parse Config.toml")?;
        Ok(cfg)
    }
}
