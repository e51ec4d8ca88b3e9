//! Allocation domain - greedy capital distribution across pools

mod optimizer;

pub use optimizer::AllocationOptimizer;

use std::time::Duration;

use crate::shared::errors::{AllocationError, ConfigError};
use crate::shared::types::{Amount, PoolAllocation};

pub const DEFAULT_THRESHOLD_BPS: u32 = 10_000;
pub const DEFAULT_INCREMENT_DIVISOR: u32 = 3;
pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Optimizer tuning
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Share of total assets to allocate, in basis points
    pub allocation_threshold_bps: u32,
    /// Step size is `total_assets / increment_divisor`
    pub increment_divisor: u32,
    /// Applies to each quote call, not to the run
    pub quote_timeout: Duration,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            allocation_threshold_bps: DEFAULT_THRESHOLD_BPS,
            increment_divisor: DEFAULT_INCREMENT_DIVISOR,
            quote_timeout: DEFAULT_QUOTE_TIMEOUT,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.increment_divisor == 0 {
            return Err(ConfigError::InvalidDivisor);
        }
        if self.allocation_threshold_bps == 0 || self.allocation_threshold_bps > 10_000 {
            return Err(ConfigError::InvalidThreshold(self.allocation_threshold_bps));
        }
        Ok(())
    }
}

/// Per-pool accumulator owned by one optimization run
#[derive(Debug, Clone, PartialEq)]
pub struct PoolState {
    pub address: String,
    /// Base units (18 decimals)
    pub allocated_amount: Amount,
    /// Native units of the pool's asset; never decreases during a run
    pub simulated_deposit: Amount,
}

impl PoolState {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            allocated_amount: 0,
            simulated_deposit: 0,
        }
    }
}

/// Result of one optimization run
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    /// In pool order
    pub allocations: Vec<PoolAllocation>,
    pub total_assets: Amount,
    /// `total_assets` scaled by the allocation threshold
    pub budget: Amount,
    pub step: Amount,
    pub rounds: u32,
    /// True when a round ended with no valid quote
    pub incomplete: bool,
}

impl AllocationOutcome {
    pub fn total_allocated(&self) -> Amount {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// Part of the budget no pool received
    pub fn unallocated(&self) -> Amount {
        self.budget.saturating_sub(self.total_allocated())
    }

    pub fn active_pools(&self) -> usize {
        self.allocations.iter().filter(|a| a.amount > 0).count()
    }

    pub fn amount_for(&self, address: &str) -> Option<Amount> {
        self.allocations
            .iter()
            .find(|a| a.address == address)
            .map(|a| a.amount)
    }

    /// Sum stays within budget, and enough pools are active whenever
    /// a non-zero step made that possible
    pub fn check_invariants(&self, min_active_pools: usize) -> Result<(), AllocationError> {
        let total = self.total_allocated();
        if total > self.budget {
            return Err(AllocationError::InvariantViolated(format!(
                "allocated {} exceeds budget {}",
                total, self.budget
            )));
        }
        let required = required_active(min_active_pools, self.allocations.len(), self.budget);
        if self.step > 0 && self.active_pools() < required {
            return Err(AllocationError::InvariantViolated(format!(
                "{} active pools, at least {} required",
                self.active_pools(),
                required
            )));
        }
        Ok(())
    }
}

/// Pools that must end up holding a balance. A pool needs at least one
/// base unit to count as active, so a budget smaller than the pool count
/// lowers the requirement.
pub fn required_active(min_active_pools: usize, pool_count: usize, budget: Amount) -> usize {
    let affordable = usize::try_from(budget).unwrap_or(usize::MAX);
    min_active_pools.min(pool_count).min(affordable)
}
