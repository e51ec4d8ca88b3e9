//! Isolated lending pair (silo) read through EVM view calls.
//!
//! Reads:
//! - pair: `asset()`, `rateContract()`, `totalAsset()`, `totalBorrow()`,
//!   `currentRateInfo()`, `balanceOf(address)`, `convertToAssets(uint256)`
//! - asset: `decimals()`
//! - rate contract: `getConstants()` -> (min rate, vertex rate, max rate, vertex utilization)

use std::sync::Arc;
use tracing::{debug, warn};

use crate::infrastructure::abi;
use crate::infrastructure::rpc::{Connection, EvmRpc};
use crate::math::{self, KinkedRateModel};
use crate::shared::errors::{PoolError, QuoteError, RpcError};
use crate::shared::types::{Amount, ProviderType, DEFAULT_ASSET_DECIMALS};

/// Per-second rates are fixed point with 18 decimals
const RATE_PRECISION: f64 = 1e18;
/// Utilization and protocol fee precision
const UTIL_PRECISION: f64 = 1e5;

/// Pair state captured by `sync`
#[derive(Debug, Clone, PartialEq)]
pub struct LendingPairState {
    pub block: u64,
    pub total_supplied: Amount,
    pub total_borrowed: Amount,
    /// Fraction of interest kept by the protocol
    pub protocol_fee: f64,
    pub rate_model: KinkedRateModel,
    /// Current position of the allocating user, in asset units
    pub user_position: Amount,
}

pub struct LendingPairPool {
    id: String,
    contract_address: String,
    user_address: String,
    decimals: u8,
    known_decimals: Option<u8>,
    rpc: Option<Arc<dyn EvmRpc>>,
    rate_contract: Option<String>,
    state: Option<LendingPairState>,
}

impl LendingPairPool {
    pub fn new(id: &str, contract_address: &str, user_address: &str, known_decimals: Option<u8>) -> Self {
        Self {
            id: id.to_string(),
            contract_address: contract_address.to_string(),
            user_address: user_address.to_string(),
            decimals: known_decimals.unwrap_or(DEFAULT_ASSET_DECIMALS),
            known_decimals,
            rpc: None,
            rate_contract: None,
            state: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn state(&self) -> Option<&LendingPairState> {
        self.state.as_ref()
    }

    /// Bind to the chain, resolve the asset precision and the rate contract
    pub async fn initialize(&mut self, connection: &Connection) -> Result<(), PoolError> {
        let rpc = match connection {
            Connection::Evm(rpc) => Arc::clone(rpc),
            other => {
                return Err(PoolError::ConnectionMismatch {
                    address: self.id.clone(),
                    expected: ProviderType::EthereumMainnet.to_string(),
                    actual: other.provider().to_string(),
                })
            }
        };

        let init_failed = |source: RpcError| PoolError::InitFailed {
            address: self.id.clone(),
            source,
        };

        let rate_contract = view_address(rpc.as_ref(), &self.contract_address, "rateContract()", None)
            .await
            .map_err(init_failed)?;

        if self.known_decimals.is_none() {
            self.decimals = match self.lookup_decimals(rpc.as_ref()).await {
                Ok(decimals) => decimals,
                Err(e) => {
                    warn!(
                        "Decimals lookup for {} failed, assuming {}: {}",
                        self.id, DEFAULT_ASSET_DECIMALS, e
                    );
                    DEFAULT_ASSET_DECIMALS
                }
            };
        }

        debug!("Initialized lending pair {} ({} decimals)", self.id, self.decimals);
        self.rate_contract = Some(rate_contract);
        self.rpc = Some(rpc);
        Ok(())
    }

    async fn lookup_decimals(&self, rpc: &dyn EvmRpc) -> Result<u8, RpcError> {
        let asset = view_address(rpc, &self.contract_address, "asset()", None).await?;
        let data = rpc.call(&asset, &abi::encode_call("decimals()"), None).await?;
        let decimals = abi::decode_uint(&data, 0)?;
        u8::try_from(decimals)
            .ok()
            .filter(|d| *d <= 36)
            .ok_or_else(|| RpcError::Decode(format!("implausible decimals {}", decimals)))
    }

    /// Refresh supply, borrow, fee, rate curve and user position at the latest block
    pub async fn sync(&mut self) -> Result<(), PoolError> {
        let (rpc, rate_contract) = match (&self.rpc, &self.rate_contract) {
            (Some(rpc), Some(rate_contract)) => (Arc::clone(rpc), rate_contract.clone()),
            _ => return Err(PoolError::NotInitialized(self.id.clone())),
        };
        let state = self
            .read_state(rpc.as_ref(), &rate_contract)
            .await
            .map_err(|source| PoolError::SyncFailed {
                address: self.id.clone(),
                source,
            })?;
        debug!(
            "Synced {} at block {}: supplied={} borrowed={} user={}",
            self.id, state.block, state.total_supplied, state.total_borrowed, state.user_position
        );
        self.state = Some(state);
        Ok(())
    }

    async fn read_state(&self, rpc: &dyn EvmRpc, rate_contract: &str) -> Result<LendingPairState, RpcError> {
        let block = rpc.block_number().await?;
        let at = Some(block);
        let pair = self.contract_address.as_str();

        let total_asset_call = abi::encode_call("totalAsset()");
        let total_borrow_call = abi::encode_call("totalBorrow()");
        let rate_info_call = abi::encode_call("currentRateInfo()");
        let constants_call = abi::encode_call("getConstants()");
        let balance_call = abi::encode_call_address("balanceOf(address)", &self.user_address)?;
        let (total_asset, total_borrow, rate_info, constants, user_shares) = tokio::try_join!(
            rpc.call(pair, &total_asset_call, at),
            rpc.call(pair, &total_borrow_call, at),
            rpc.call(pair, &rate_info_call, at),
            rpc.call(rate_contract, &constants_call, at),
            rpc.call(pair, &balance_call, at),
        )?;

        let user_shares = abi::decode_uint(&user_shares, 0)?;
        let user_position = if user_shares == 0 {
            0
        } else {
            let data = rpc
                .call(pair, &abi::encode_call_uint("convertToAssets(uint256)", user_shares), at)
                .await?;
            abi::decode_uint(&data, 0)?
        };

        let rate_model = KinkedRateModel {
            min_rate: abi::decode_uint(&constants, 0)? as f64 / RATE_PRECISION,
            vertex_rate: abi::decode_uint(&constants, 1)? as f64 / RATE_PRECISION,
            max_rate: abi::decode_uint(&constants, 2)? as f64 / RATE_PRECISION,
            vertex_utilization: abi::decode_uint(&constants, 3)? as f64 / UTIL_PRECISION,
        };

        Ok(LendingPairState {
            block,
            total_supplied: abi::decode_uint(&total_asset, 0)?,
            total_borrowed: abi::decode_uint(&total_borrow, 0)?,
            protocol_fee: abi::decode_uint(&rate_info, 1)? as f64 / UTIL_PRECISION,
            rate_model,
            user_position,
        })
    }

    /// Supply APY if the user's position in this pair became
    /// `simulated_deposit + increment` (native units)
    pub fn quote(&self, simulated_deposit: Amount, increment: Amount) -> Result<f64, QuoteError> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| QuoteError::NotSynced(self.id.clone()))?;
        let target = simulated_deposit.saturating_add(increment);
        let supplied = state
            .total_supplied
            .saturating_sub(state.user_position)
            .saturating_add(target);
        let apy = math::supply_apy(state.total_borrowed, supplied, &state.rate_model, state.protocol_fee);
        if !apy.is_finite() {
            return Err(QuoteError::NonFinite(apy));
        }
        Ok(apy)
    }
}

async fn view_address(rpc: &dyn EvmRpc, to: &str, signature: &str, block: Option<u64>) -> Result<String, RpcError> {
    let data = rpc.call(to, &abi::encode_call(signature), block).await?;
    abi::decode_address(&data, 0)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub const PAIR: &str = "0x6311ff24fb15310ed3d2180d3d0507a21a8e5227";
    pub const ASSET: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    pub const RATE: &str = "0x26fe402a57d52c8a323bb6e09f06489c8216ac88";
    pub const USER: &str = "0x73e4c11b670ef9c025a030a20b72cb9150e54523";

    /// EVM node answering view calls from a `(contract, selector)` table
    pub struct FakeEvm {
        responses: Mutex<HashMap<(String, [u8; 4]), Vec<u8>>>,
    }

    impl FakeEvm {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
            }
        }

        pub fn respond(&self, to: &str, signature: &str, words: &[u128]) {
            let data = words.iter().flat_map(|w| abi::encode_uint(*w)).collect();
            self.responses
                .lock()
                .unwrap()
                .insert((to.to_string(), abi::selector(signature)), data);
        }

        pub fn respond_address(&self, to: &str, signature: &str, address: &str) {
            let data = abi::encode_address(address).unwrap().to_vec();
            self.responses
                .lock()
                .unwrap()
                .insert((to.to_string(), abi::selector(signature)), data);
        }

        /// A pair with 1000 units supplied, 800 borrowed, 10% fee
        pub fn silo(decimals: u128, user_shares: u128) -> Self {
            let evm = Self::new();
            let unit = 10u128.pow(decimals as u32);
            evm.respond_address(PAIR, "asset()", ASSET);
            evm.respond_address(PAIR, "rateContract()", RATE);
            evm.respond(ASSET, "decimals()", &[decimals]);
            evm.respond(PAIR, "totalAsset()", &[1_000 * unit, 1_000 * unit]);
            evm.respond(PAIR, "totalBorrow()", &[800 * unit, 800 * unit]);
            evm.respond(PAIR, "currentRateInfo()", &[1, 10_000, 0, 0, 0]);
            // 0% at 0 util, ~3.15% at 80%, ~31.5% at 100% (per-second rates)
            evm.respond(RATE, "getConstants()", &[0, 1_000_000_000, 10_000_000_000, 80_000]);
            evm.respond(PAIR, "balanceOf(address)", &[user_shares]);
            evm.respond(PAIR, "convertToAssets(uint256)", &[user_shares]);
            evm
        }
    }

    #[async_trait]
    impl EvmRpc for FakeEvm {
        fn endpoint(&self) -> &str {
            "fake://evm"
        }

        async fn block_number(&self) -> Result<u64, RpcError> {
            Ok(20_000_000)
        }

        async fn call(&self, to: &str, data: &[u8], _block: Option<u64>) -> Result<Vec<u8>, RpcError> {
            let mut selector = [0u8; 4];
            selector.copy_from_slice(&data[..4]);
            self.responses
                .lock()
                .unwrap()
                .get(&(to.to_lowercase(), selector))
                .cloned()
                .ok_or_else(|| RpcError::Remote {
                    code: -32000,
                    message: "execution reverted".to_string(),
                })
        }
    }

    async fn synced(evm: FakeEvm, known_decimals: Option<u8>) -> LendingPairPool {
        let connection = Connection::Evm(Arc::new(evm));
        let mut pool = LendingPairPool::new(PAIR, PAIR, USER, known_decimals);
        pool.initialize(&connection).await.unwrap();
        pool.sync().await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_initialize_reads_decimals() {
        let pool = synced(FakeEvm::silo(18, 0), None).await;
        assert_eq!(pool.decimals(), 18);
        let state = pool.state().unwrap();
        assert_eq!(state.total_borrowed, 800 * 10u128.pow(18));
        assert!((state.protocol_fee - 0.1).abs() < 1e-12);
        assert!((state.rate_model.vertex_utilization - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_decimals_fall_back_to_default() {
        let evm = FakeEvm::silo(18, 0);
        evm.respond(ASSET, "decimals()", &[]);
        let pool = synced(evm, None).await;
        assert_eq!(pool.decimals(), DEFAULT_ASSET_DECIMALS);
    }

    #[tokio::test]
    async fn test_known_decimals_skip_lookup() {
        let pool = synced(FakeEvm::silo(18, 0), Some(8)).await;
        assert_eq!(pool.decimals(), 8);
    }

    #[tokio::test]
    async fn test_quote_falls_with_deposit() {
        let pool = synced(FakeEvm::silo(6, 0), None).await;
        let unit = 1_000_000u128;
        let small = pool.quote(0, 10 * unit).unwrap();
        let large = pool.quote(0, 1_000 * unit).unwrap();
        let stacked = pool.quote(990 * unit, 10 * unit).unwrap();
        assert!(small > large);
        assert!((stacked - large).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_existing_position_is_replaced_not_added() {
        let unit = 1_000_000u128;
        let with_position = synced(FakeEvm::silo(6, 200 * unit), None).await;
        let without = synced(FakeEvm::silo(6, 0), None).await;
        // moving to a 200 unit target is a no-op for a user already holding 200
        let unchanged = with_position.quote(0, 200 * unit).unwrap();
        let current = without.quote(0, 0).unwrap();
        assert!((unchanged - current).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_quote_before_sync_fails() {
        let pool = LendingPairPool::new(PAIR, PAIR, USER, None);
        assert!(matches!(pool.quote(0, 1), Err(QuoteError::NotSynced(_))));
    }

    #[tokio::test]
    async fn test_sync_before_initialize_fails() {
        let mut pool = LendingPairPool::new(PAIR, PAIR, USER, None);
        assert!(matches!(pool.sync().await, Err(PoolError::NotInitialized(_))));
    }
}
