//! Common types used across the application

use blake2::{Blake2b512, Digest};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::shared::errors::ConfigError;

/// Capital amount in the allocator's base unit
pub type Amount = u128;

/// Fixed internal precision of every `Amount` handled by the optimizer
pub const BASE_DECIMALS: u8 = 18;

/// Precision assumed when a pool's asset decimals cannot be looked up
pub const DEFAULT_ASSET_DECIMALS: u8 = 6;

/// Native precision of subnet alpha (rao)
pub const ALPHA_DECIMALS: u8 = 9;

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Chain/network a pool's rate data is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    EthereumMainnet,
    BittensorMainnet,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::EthereumMainnet => "ETHEREUM_MAINNET",
            ProviderType::BittensorMainnet => "BITTENSOR_MAINNET",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ETHEREUM_MAINNET" => Ok(ProviderType::EthereumMainnet),
            "BITTENSOR_MAINNET" => Ok(ProviderType::BittensorMainnet),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Pool model discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolModelKind {
    EvmChainBased,
    Bittensor,
}

/// Protocol of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolType {
    /// Isolated lending pair with a kinked interest-rate model
    SturdySilo,
    /// Delegated alpha stake on a subnet validator
    BtAlpha,
}

/// Identity and configuration of one pool for an allocation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    #[serde(rename = "pool_model_disc")]
    pub model: PoolModelKind,
    pub pool_type: PoolType,
    /// Contract address (EVM) or validator hotkey (Bittensor)
    pub contract_address: String,
    #[serde(rename = "pool_data_provider_type")]
    pub provider: ProviderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netuid: Option<u16>,
    /// Known asset precision; looked up on-chain when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

impl PoolDescriptor {
    /// Check that model, provider and pool type agree and the address is well formed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPool {
            address: self.contract_address.clone(),
            reason: reason.to_string(),
        };

        match (self.model, self.pool_type, self.provider) {
            (PoolModelKind::EvmChainBased, PoolType::SturdySilo, ProviderType::EthereumMainnet) => {
                if !is_evm_address(&self.contract_address) {
                    return Err(invalid("not a 20-byte hex address"));
                }
            }
            (PoolModelKind::Bittensor, PoolType::BtAlpha, ProviderType::BittensorMainnet) => {
                if !is_ss58_address(&self.contract_address) {
                    return Err(invalid("not an ss58 hotkey"));
                }
                if self.netuid.is_none() {
                    return Err(invalid("alpha pools require a netuid"));
                }
            }
            _ => return Err(invalid("pool model, pool type and provider do not match")),
        }

        if let Some(decimals) = self.decimals {
            if decimals > 36 {
                return Err(invalid("decimals out of range"));
            }
        }
        Ok(())
    }

    /// The descriptor's own user unless it is unset or the zero address
    pub fn resolve_user<'a>(&'a self, request_user: &'a str) -> &'a str {
        match self.user_address.as_deref() {
            Some(user) if !user.eq_ignore_ascii_case(ZERO_ADDRESS) && !user.is_empty() => user,
            _ => request_user,
        }
    }
}

pub fn is_evm_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}

const SS58_CHECKSUM_CONTEXT: &[u8] = b"SS58PRE";

/// ss58 with a one-byte network prefix: prefix + 32-byte key + 2-byte checksum.
/// The checksum is the first two bytes of blake2b-512 over
/// `"SS58PRE" || prefix || key`.
pub fn is_ss58_address(address: &str) -> bool {
    let bytes = match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    if bytes.len() != 35 || bytes[0] >= 64 {
        return false;
    }
    let (payload, checksum) = bytes.split_at(33);
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_CHECKSUM_CONTEXT);
    hasher.update(payload);
    hasher.finalize()[..2] == *checksum
}

/// Pools in request order. Iteration order decides tie-breaks, so the
/// JSON object is read into a sequence rather than a hash map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolSet(Vec<(String, PoolDescriptor)>);

impl PoolSet {
    pub fn new(pools: Vec<(String, PoolDescriptor)>) -> Self {
        Self(pools)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, PoolDescriptor)> {
        self.0.iter()
    }
}

impl Serialize for PoolSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, descriptor) in &self.0 {
            map.serialize_entry(id, descriptor)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PoolSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PoolSetVisitor;

        impl<'de> Visitor<'de> for PoolSetVisitor {
            type Value = PoolSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of pool id to pool descriptor")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PoolSet, A::Error> {
                let mut pools = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((id, descriptor)) = access.next_entry::<String, PoolDescriptor>()? {
                    if pools.iter().any(|(existing, _)| existing == &id) {
                        return Err(serde::de::Error::custom(format!("duplicate pool id {}", id)));
                    }
                    pools.push((id, descriptor));
                }
                Ok(PoolSet(pools))
            }
        }

        deserializer.deserialize_map(PoolSetVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsAndPools {
    pub total_assets: Amount,
    pub pools: PoolSet,
}

/// Allocation request as received from the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    #[serde(rename = "num_allocs")]
    pub min_active_pools: usize,
    #[serde(default)]
    pub request_type: Option<String>,
    pub user_address: String,
    pub assets_and_pools: AssetsAndPools,
}

/// Final amount assigned to one pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolAllocation {
    pub address: String,
    pub amount: Amount,
}

/// Serialize allocations as a JSON object keyed by pool id, in run order
pub fn serialize_allocations<S: Serializer>(
    allocations: &[PoolAllocation],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(allocations.len()))?;
    for allocation in allocations {
        map.serialize_entry(&allocation.address, &allocation.amount)?;
    }
    map.end()
}
