//! Historical yield domain - trailing alpha stake yield from dividend history

mod estimator;
mod queries;
#[cfg(test)]
pub(crate) mod testing;

pub use estimator::{ApyQuery, YieldEstimator, DEFAULT_PERIODS_PER_YEAR};
pub use queries::AlphaQueries;
