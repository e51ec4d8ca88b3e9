//! Greedy fixed-step optimizer

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{required_active, AllocationOutcome, OptimizerConfig, PoolState};
use crate::domain::pool::YieldSource;
use crate::math;
use crate::shared::errors::{AllocationError, ConfigError, QuoteError};
use crate::shared::types::{Amount, PoolAllocation, BASE_DECIMALS};

/// Splits capital into `increment_divisor` steps and hands each step to the
/// pool quoting the best marginal yield for it
pub struct AllocationOptimizer {
    config: OptimizerConfig,
}

impl AllocationOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Distribute `total_assets` (base units) across `pools`, in pool order.
    ///
    /// Only configuration problems are errors. Failed or timed out quotes
    /// disqualify a pool for one round; a round with no valid quote ends the
    /// greedy loop and marks the outcome incomplete.
    pub async fn optimize<P: YieldSource>(
        &self,
        total_assets: Amount,
        pools: &[P],
        min_active_pools: usize,
    ) -> Result<AllocationOutcome, AllocationError> {
        self.config.validate()?;
        if pools.is_empty() {
            return Err(ConfigError::EmptyPoolSet.into());
        }
        if min_active_pools == 0 {
            return Err(ConfigError::InvalidMinActivePools.into());
        }

        let mut states: Vec<PoolState> = pools.iter().map(|p| PoolState::new(p.address())).collect();
        let budget = math::apply_bps(total_assets, self.config.allocation_threshold_bps);
        let step = total_assets / self.config.increment_divisor as Amount;

        if step == 0 {
            debug!("Step size is zero for {} total assets, nothing to allocate", total_assets);
            return Ok(finish(states, total_assets, budget, step, 0, false));
        }

        info!(
            "Allocating {} across {} pools: step {}, budget {}, min active {}",
            total_assets,
            pools.len(),
            step,
            budget,
            min_active_pools
        );

        let mut remaining = budget;
        let mut rounds = 0u32;
        let mut last_winner = None;
        let mut incomplete = false;

        while remaining >= step {
            let quotes = join_all(
                pools
                    .iter()
                    .zip(&states)
                    .map(|(pool, state)| self.quote(pool, state.simulated_deposit, step)),
            )
            .await;

            let Some(winner) = select_best(&quotes) else {
                warn!(
                    "No pool returned a valid quote in round {}, stopping with {} unallocated",
                    rounds + 1,
                    remaining
                );
                incomplete = true;
                break;
            };

            let state = &mut states[winner];
            state.allocated_amount += step;
            state.simulated_deposit = state
                .simulated_deposit
                .saturating_add(math::rescale_amount(step, BASE_DECIMALS, pools[winner].decimals()));
            remaining -= step;
            rounds += 1;
            last_winner = Some(winner);

            debug!(
                "Round {}: {} wins at {:.6}, {} remaining",
                rounds,
                state.address,
                quotes[winner].unwrap_or_default(),
                remaining
            );
        }

        // The last round's winner still holds the best quote
        if remaining > 0 && !incomplete {
            if let Some(winner) = last_winner {
                debug!("Adding remainder {} to {}", remaining, states[winner].address);
                states[winner].allocated_amount += remaining;
            }
        }

        enforce_min_active(&mut states, min_active_pools, step, budget);

        let outcome = finish(states, total_assets, budget, step, rounds, incomplete);
        info!(
            "Allocation finished after {} rounds: {} allocated, {} unallocated{}",
            outcome.rounds,
            outcome.total_allocated(),
            outcome.unallocated(),
            if outcome.incomplete { " (incomplete)" } else { "" }
        );
        Ok(outcome)
    }

    /// Marginal yield for one more `step`, or `None` when the pool is disqualified
    async fn quote<P: YieldSource>(&self, pool: &P, simulated_deposit: Amount, step: Amount) -> Option<f64> {
        let increment = math::rescale_amount(step, BASE_DECIMALS, pool.decimals());
        let result = match tokio::time::timeout(self.config.quote_timeout, pool.quote(simulated_deposit, increment)).await
        {
            Ok(result) => result,
            Err(_) => Err(QuoteError::Timeout(self.config.quote_timeout)),
        };
        match result {
            Ok(apy) if apy.is_finite() => Some(apy),
            Ok(apy) => {
                warn!("Discarding quote from {}: {}", pool.address(), QuoteError::NonFinite(apy));
                None
            }
            Err(e) => {
                warn!("Quote from {} failed: {}", pool.address(), e);
                None
            }
        }
    }
}

/// First strictly greater yield wins, so ties go to the earlier pool
fn select_best(quotes: &[Option<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, quote) in quotes.iter().enumerate() {
        let Some(apy) = *quote else { continue };
        match best {
            Some((_, top)) if apy <= top => {}
            _ => best = Some((index, apy)),
        }
    }
    best.map(|(index, _)| index)
}

/// Top up idle pools in order until enough of them hold a balance, then
/// take any overshoot of the budget back from the largest allocations.
///
/// The top-up is 1% of a step, capped so that every required pool can hold
/// it within the budget. No pool that holds a balance is taken below one unit.
fn enforce_min_active(states: &mut [PoolState], min_active_pools: usize, step: Amount, budget: Amount) {
    let required = required_active(min_active_pools, states.len(), budget);
    let mut active = states.iter().filter(|s| s.allocated_amount > 0).count();
    if active >= required {
        return;
    }

    let floor = (step / 100).max(1).min((budget / required as Amount).max(1));
    for state in states.iter_mut() {
        if active >= required {
            break;
        }
        if state.allocated_amount == 0 {
            state.allocated_amount = floor;
            active += 1;
            debug!("Topped up {} to {}", state.address, floor);
        }
    }

    let total: Amount = states.iter().map(|s| s.allocated_amount).sum();
    let mut excess = total.saturating_sub(budget);
    while excess > 0 {
        let mut largest: Option<usize> = None;
        for (index, state) in states.iter().enumerate() {
            if state.allocated_amount > 1
                && largest.map_or(true, |l| state.allocated_amount > states[l].allocated_amount)
            {
                largest = Some(index);
            }
        }
        let Some(largest) = largest else {
            warn!("Excess {} left over, every active pool is at one unit", excess);
            break;
        };
        let state = &mut states[largest];
        let taken = excess.min(state.allocated_amount - 1);
        state.allocated_amount -= taken;
        excess -= taken;
        debug!("Removed excess {} from {}", taken, state.address);
    }
}

fn finish(
    states: Vec<PoolState>,
    total_assets: Amount,
    budget: Amount,
    step: Amount,
    rounds: u32,
    incomplete: bool,
) -> AllocationOutcome {
    AllocationOutcome {
        allocations: states
            .into_iter()
            .map(|s| PoolAllocation {
                address: s.address,
                amount: s.allocated_amount,
            })
            .collect(),
        total_assets,
        budget,
        step,
        rounds,
        incomplete,
    }
}
