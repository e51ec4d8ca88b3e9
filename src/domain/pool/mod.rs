//! Pool domain - yield-bearing pools the allocator can deposit into

mod alpha_stake;
mod lending_pair;
mod model;

pub use alpha_stake::{AlphaStakePool, DEFAULT_LOOKBACK_BLOCKS};
pub use lending_pair::{LendingPairPool, LendingPairState};
pub use model::{ChainHandle, PoolModel};

#[cfg(test)]
pub(crate) use lending_pair::tests as fake_evm;

use async_trait::async_trait;

use crate::shared::errors::QuoteError;
use crate::shared::types::Amount;

/// Anything the optimizer can ask for a marginal yield
#[async_trait]
pub trait YieldSource: Send + Sync {
    /// Identifier the allocation is keyed by
    fn address(&self) -> &str;

    /// Native precision of the pool's asset
    fn decimals(&self) -> u8;

    /// Annualized yield if the allocator's position became
    /// `simulated_deposit + increment`, both in native units.
    /// Must not mutate pool state.
    async fn quote(&self, simulated_deposit: Amount, increment: Amount) -> Result<f64, QuoteError>;
}
