//! Cached subnet queries shared by the yield estimator and alpha pools

use std::sync::Arc;
use tracing::{debug, error, trace};

use crate::infrastructure::cache::{FetchFailed, Fetched, QueryCache};
use crate::infrastructure::rpc::{DynamicInfo, Metagraph, SubtensorRpc};
use crate::math;
use crate::shared::errors::RpcError;
use crate::shared::types::ALPHA_DECIMALS;

type ConnId = Arc<str>;

struct QueriesInner {
    rpc: Arc<dyn SubtensorRpc>,
    conn_id: ConnId,
    subnets: QueryCache<(ConnId, u64, u16), DynamicInfo>,
    metagraphs: QueryCache<(ConnId, u64, u16), Metagraph>,
    dividends: QueryCache<(ConnId, u64, String, u16), Option<f64>>,
    stakes: QueryCache<(ConnId, u64, String, u16), Option<f64>>,
}

/// Subnet reads memoized per `(connection, block, arguments)`.
/// Cloning shares the caches.
#[derive(Clone)]
pub struct AlphaQueries {
    inner: Arc<QueriesInner>,
}

fn failed(what: &str, block: u64, err: RpcError) -> FetchFailed {
    error!("Error fetching {} for block {}: {}", what, block, err);
    FetchFailed(err.to_string())
}

impl AlphaQueries {
    pub fn new(rpc: Arc<dyn SubtensorRpc>, capacity: usize) -> Self {
        let conn_id: ConnId = Arc::from(rpc.endpoint());
        Self {
            inner: Arc::new(QueriesInner {
                rpc,
                conn_id,
                subnets: QueryCache::new("subnet", capacity),
                metagraphs: QueryCache::new("metagraph", capacity),
                dividends: QueryCache::new("dividends", capacity),
                stakes: QueryCache::new("stake", capacity),
            }),
        }
    }

    /// Chain head; never cached
    pub async fn current_block(&self) -> Result<u64, RpcError> {
        self.inner.rpc.current_block().await
    }

    pub async fn dynamic_info(&self, netuid: u16, block: u64) -> Fetched<DynamicInfo> {
        let rpc = Arc::clone(&self.inner.rpc);
        let key = (Arc::clone(&self.inner.conn_id), block, netuid);
        self.inner
            .subnets
            .get_or_fetch(key, move || async move {
                rpc.dynamic_info(netuid, Some(block))
                    .await
                    .map_err(|e| failed("subnet info", block, e))
            })
            .await
    }

    pub async fn metagraph(&self, block: u64, netuid: u16) -> Fetched<Metagraph> {
        let rpc = Arc::clone(&self.inner.rpc);
        let key = (Arc::clone(&self.inner.conn_id), block, netuid);
        self.inner
            .metagraphs
            .get_or_fetch(key, move || async move {
                let metagraph = rpc
                    .metagraph(netuid, block)
                    .await
                    .map_err(|e| failed("metagraph", block, e))?;
                trace!("Fetched metagraph for block {}", block);
                Ok(metagraph)
            })
            .await
    }

    /// Dividends paid to nominators of `hotkey` at `block`, net of the
    /// validator take. `None` when the hotkey has no uid on the subnet.
    pub async fn nominator_dividends(&self, block: u64, hotkey: &str, netuid: u16) -> Fetched<Option<f64>> {
        let this = self.clone();
        let owned_hotkey = hotkey.to_string();
        let key = (Arc::clone(&self.inner.conn_id), block, hotkey.to_string(), netuid);
        self.inner
            .dividends
            .get_or_fetch(key, move || async move {
                let rpc = Arc::clone(&this.inner.rpc);
                let uid = match rpc.uid_for_hotkey(&owned_hotkey, netuid, block).await {
                    Ok(Some(uid)) => uid,
                    Ok(None) => return Ok(None),
                    Err(e) => return Err(failed("dividends", block, e)),
                };
                let take = rpc
                    .delegate_take(&owned_hotkey, block)
                    .await
                    .map_err(|e| failed("delegate take", block, e))?;
                let metagraph = this.metagraph(block, netuid).await?;
                let dividends = metagraph.dividends_for_uid(uid).map(|divs| divs * (1.0 - take));
                trace!("Fetched dividends for block {}: {:?}", block, dividends);
                Ok(dividends)
            })
            .await
    }

    /// Total alpha staked on `hotkey` at `block`, in alpha units.
    /// `None` when the hotkey has no uid on the subnet.
    pub async fn total_stake(&self, block: u64, hotkey: &str, netuid: u16) -> Fetched<Option<f64>> {
        let rpc = Arc::clone(&self.inner.rpc);
        let owned_hotkey = hotkey.to_string();
        let key = (Arc::clone(&self.inner.conn_id), block, hotkey.to_string(), netuid);
        self.inner
            .stakes
            .get_or_fetch(key, move || async move {
                let uid = rpc
                    .uid_for_hotkey(&owned_hotkey, netuid, block)
                    .await
                    .map_err(|e| failed("stake", block, e))?;
                if uid.is_none() {
                    return Ok(None);
                }
                let rao = rpc
                    .total_hotkey_alpha(&owned_hotkey, netuid, block)
                    .await
                    .map_err(|e| failed("stake", block, e))?;
                Ok(Some(math::to_float(rao as u128, ALPHA_DECIMALS)))
            })
            .await
    }

    pub fn log_stats(&self) {
        self.inner.subnets.log_stats();
        self.inner.metagraphs.log_stats();
        self.inner.dividends.log_stats();
        self.inner.stakes.log_stats();
        debug!("Alpha query caches bound to {}", self.inner.conn_id);
    }
}
