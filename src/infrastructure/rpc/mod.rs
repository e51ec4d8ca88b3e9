//! Chain connections over JSON-RPC

pub mod connection;
pub mod evm;
pub mod subtensor;
pub mod transport;

pub use connection::{Connection, ConnectionFactory};
pub use evm::{EvmRpc, EvmRpcClient};
pub use subtensor::{DynamicInfo, Metagraph, SubtensorRpc, SubtensorRpcClient};
pub use transport::JsonRpcTransport;
