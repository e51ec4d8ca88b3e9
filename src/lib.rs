//! Poolalloc - greedy yield allocator for lending and staking pools
//! Built with Domain-Driven Design principles

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod math;
pub mod shared;

// Re-export main types for convenience
pub use application::{AllocationReport, AllocationService};
pub use domain::allocation::{AllocationOptimizer, OptimizerConfig};
pub use domain::pool::{PoolModel, YieldSource};
pub use domain::yield_history::YieldEstimator;
pub use infrastructure::QueryCache;
