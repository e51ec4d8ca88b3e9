//! Delegated alpha stake on a subnet validator

use std::sync::Arc;
use tracing::debug;

use crate::domain::yield_history::{ApyQuery, YieldEstimator};
use crate::math;
use crate::shared::errors::{PoolError, QuoteError};
use crate::shared::types::{Amount, ALPHA_DECIMALS};

pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 7_200;

pub struct AlphaStakePool {
    id: String,
    hotkey: String,
    netuid: u16,
    decimals: u8,
    lookback_blocks: u64,
    estimator: Option<Arc<YieldEstimator>>,
    head: Option<u64>,
}

impl AlphaStakePool {
    pub fn new(id: &str, hotkey: &str, netuid: u16, known_decimals: Option<u8>, lookback_blocks: u64) -> Self {
        Self {
            id: id.to_string(),
            hotkey: hotkey.to_string(),
            netuid,
            decimals: known_decimals.unwrap_or(ALPHA_DECIMALS),
            lookback_blocks,
            estimator: None,
            head: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn head(&self) -> Option<u64> {
        self.head
    }

    pub fn initialize(&mut self, estimator: Arc<YieldEstimator>) {
        self.estimator = Some(estimator);
    }

    /// Pin the estimation window to the current chain head
    pub async fn sync(&mut self) -> Result<(), PoolError> {
        let estimator = self
            .estimator
            .as_ref()
            .ok_or_else(|| PoolError::NotInitialized(self.id.clone()))?;
        let head = estimator
            .queries()
            .current_block()
            .await
            .map_err(|source| PoolError::SyncFailed {
                address: self.id.clone(),
                source,
            })?;
        debug!("Synced alpha pool {} on subnet {} at block {}", self.id, self.netuid, head);
        self.head = Some(head);
        Ok(())
    }

    /// Trailing yield with `simulated_deposit + increment` (native units)
    /// added to the validator's stake
    pub async fn quote(&self, simulated_deposit: Amount, increment: Amount) -> Result<f64, QuoteError> {
        let (estimator, head) = match (&self.estimator, self.head) {
            (Some(estimator), Some(head)) => (estimator, head),
            _ => return Err(QuoteError::NotSynced(self.id.clone())),
        };
        let query = ApyQuery {
            hotkey: self.hotkey.clone(),
            netuid: self.netuid,
            start_block: head.saturating_sub(self.lookback_blocks),
            end_block: Some(head),
            interval: None,
            delta_alpha: math::to_float(simulated_deposit.saturating_add(increment), self.decimals),
        };
        let apy = estimator.try_average_apy(&query).await?;
        if !apy.is_finite() {
            return Err(QuoteError::NonFinite(apy));
        }
        Ok(apy)
    }
}
