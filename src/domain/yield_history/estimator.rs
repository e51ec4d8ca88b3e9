//! Trailing average annualized yield of delegated alpha stake

use futures::future::join_all;
use tracing::{debug, warn};

use super::queries::AlphaQueries;
use crate::math;
use crate::shared::errors::{QuoteError, RpcError};

/// Roughly seconds per year / block time / tempo
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 7280.0;

/// Parameters of one historical yield estimate
#[derive(Debug, Clone, PartialEq)]
pub struct ApyQuery {
    pub hotkey: String,
    pub netuid: u16,
    pub start_block: u64,
    /// Defaults to the chain head
    pub end_block: Option<u64>,
    /// Bucket size in blocks; defaults to the subnet tempo
    pub interval: Option<u64>,
    /// Extra stake assumed on top of the recorded stake, in alpha
    pub delta_alpha: f64,
}

pub struct YieldEstimator {
    queries: AlphaQueries,
    periods_per_year: f64,
    default_interval: Option<u64>,
}

impl YieldEstimator {
    pub fn new(queries: AlphaQueries, periods_per_year: f64, default_interval: Option<u64>) -> Self {
        Self {
            queries,
            periods_per_year,
            default_interval,
        }
    }

    pub fn queries(&self) -> &AlphaQueries {
        &self.queries
    }

    /// Mean annualized yield, or zero if anything needed for it is unavailable
    pub async fn average_apy(&self, query: &ApyQuery) -> f64 {
        match self.try_average_apy(query).await {
            Ok(apy) => apy,
            Err(e) => {
                debug!("Error calculating alpha apy, assuming it to be 0: {}", e);
                0.0
            }
        }
    }

    /// Mean annualized yield. Fails only when the chain head or subnet
    /// parameters cannot be read; missing per-interval data counts as no yield.
    pub async fn try_average_apy(&self, query: &ApyQuery) -> Result<f64, QuoteError> {
        let ending_block = match query.end_block {
            Some(block) => block,
            None => self.queries.current_block().await?,
        };
        if query.start_block >= ending_block {
            return Ok(0.0);
        }

        let info = self
            .queries
            .dynamic_info(query.netuid, ending_block)
            .await
            .map_err(|e| QuoteError::Rpc(RpcError::Transport(e.0)))?;
        let interval = query
            .interval
            .or(self.default_interval)
            .unwrap_or(info.tempo)
            .max(1);

        // Align the window so it ends at the last epoch step
        let lookback = ending_block - query.start_block;
        let last_step = info.last_step;
        let first_block = last_step.saturating_sub(lookback);
        let blocks: Vec<u64> = (first_block..last_step).step_by(interval as usize).collect();
        if blocks.is_empty() {
            return Ok(0.0);
        }

        let dividends = join_all(
            blocks
                .iter()
                .map(|block| self.queries.nominator_dividends(*block, &query.hotkey, query.netuid)),
        )
        .await;
        let stakes = join_all(
            blocks
                .iter()
                .map(|block| self.queries.total_stake(*block, &query.hotkey, query.netuid)),
        )
        .await;

        let per_interval: Vec<f64> = blocks
            .iter()
            .zip(dividends)
            .zip(stakes)
            .filter_map(|((block, divs), stake)| {
                let divs = match divs {
                    Ok(Some(divs)) => divs,
                    _ => return None,
                };
                let stake = match stake {
                    Ok(Some(stake)) => stake,
                    Ok(None) => 0.0,
                    Err(e) => {
                        warn!("No stake for block {}, counting interval as zero: {}", block, e);
                        0.0
                    }
                };
                if stake <= 0.0 {
                    return Some(0.0);
                }
                let apy = math::compound_annualize(divs / (stake + query.delta_alpha), self.periods_per_year);
                Some(if apy.is_finite() { apy } else { 0.0 })
            })
            .collect();

        let mean = math::mean_or_zero(&per_interval);
        debug!(
            "Alpha apy for {} on subnet {} over {} intervals: {}",
            query.hotkey,
            query.netuid,
            per_interval.len(),
            mean
        );
        Ok(mean)
    }
}
