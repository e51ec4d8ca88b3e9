// src/math.rs
use crate::shared::types::Amount;

pub const SECONDS_PER_YEAR: f64 = 31_536_000.0;

pub const BPS_DENOMINATOR: u128 = 10_000;

/// Rescale a fixed-point amount between decimal precisions, rounding down.
/// Saturates instead of overflowing.
pub fn rescale_amount(amount: Amount, from_decimals: u8, to_decimals: u8) -> Amount {
    if from_decimals == to_decimals {
        return amount;
    }
    if from_decimals > to_decimals {
        let factor = pow10(from_decimals - to_decimals);
        amount / factor
    } else {
        let factor = pow10(to_decimals - from_decimals);
        amount.saturating_mul(factor)
    }
}

fn pow10(exp: u8) -> u128 {
    10u128.checked_pow(exp as u32).unwrap_or(u128::MAX)
}

/// `amount * bps / 10_000` without intermediate overflow
pub fn apply_bps(amount: Amount, bps: u32) -> Amount {
    let bps = bps as u128;
    (amount / BPS_DENOMINATOR) * bps + (amount % BPS_DENOMINATOR) * bps / BPS_DENOMINATOR
}

/// Convert a fixed-point integer into a float with `decimals` places
pub fn to_float(amount: u128, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

/// Two-slope interest-rate curve. Rates are per second; utilization is a fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinkedRateModel {
    pub min_rate: f64,
    pub vertex_rate: f64,
    pub max_rate: f64,
    pub vertex_utilization: f64,
}

impl KinkedRateModel {
    /// Borrow rate per second at `utilization`
    pub fn borrow_rate(&self, utilization: f64) -> f64 {
        let utilization = utilization.clamp(0.0, 1.0);
        if self.vertex_utilization <= 0.0 {
            return self.vertex_rate + (self.max_rate - self.vertex_rate) * utilization;
        }
        if utilization <= self.vertex_utilization {
            let slope = (self.vertex_rate - self.min_rate) / self.vertex_utilization;
            self.min_rate + slope * utilization
        } else if self.vertex_utilization >= 1.0 {
            self.vertex_rate
        } else {
            let slope = (self.max_rate - self.vertex_rate) / (1.0 - self.vertex_utilization);
            self.vertex_rate + slope * (utilization - self.vertex_utilization)
        }
    }
}

/// Annual supply rate of a lending market: borrow rate * utilization, net of protocol fee
pub fn supply_apy(borrowed: Amount, supplied: Amount, model: &KinkedRateModel, protocol_fee: f64) -> f64 {
    if supplied == 0 {
        return 0.0;
    }
    let utilization = (borrowed as f64 / supplied as f64).min(1.0);
    let per_second = model.borrow_rate(utilization) * utilization * (1.0 - protocol_fee.clamp(0.0, 1.0));
    per_second * SECONDS_PER_YEAR
}

/// `(1 + period_return)^periods_per_year - 1`
pub fn compound_annualize(period_return: f64, periods_per_year: f64) -> f64 {
    (1.0 + period_return).powf(periods_per_year) - 1.0
}

/// Arithmetic mean, with zero for an empty slice or a non-finite result
pub fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean.is_finite() {
        mean
    } else {
        0.0
    }
}
