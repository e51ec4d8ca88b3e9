//! Infrastructure - chain access, call encoding and query caching

pub mod abi;
pub mod cache;
pub mod rpc;

pub use cache::{CacheStats, FetchFailed, Fetched, QueryCache};
pub use rpc::{Connection, ConnectionFactory};
