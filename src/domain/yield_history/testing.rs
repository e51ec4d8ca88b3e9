//! In-memory subtensor used by unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::infrastructure::rpc::{DynamicInfo, Metagraph, SubtensorRpc};
use crate::shared::errors::RpcError;

#[derive(Default)]
struct FakeState {
    hotkeys: Vec<String>,
    dividends: HashMap<String, f64>,
    takes: HashMap<String, f64>,
    stakes: HashMap<String, u64>,
    failing: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
}

/// Subnet with constant per-block dividends and stake
pub struct FakeSubtensor {
    head: u64,
    tempo: u64,
    last_step: u64,
    state: Mutex<FakeState>,
}

impl FakeSubtensor {
    pub fn new(head: u64, tempo: u64, last_step: u64) -> Self {
        Self {
            head,
            tempo,
            last_step,
            state: Mutex::new(FakeState::default()),
        }
    }

    fn register(state: &mut FakeState, hotkey: &str) {
        if !state.hotkeys.iter().any(|h| h == hotkey) {
            state.hotkeys.push(hotkey.to_string());
        }
    }

    pub fn set_dividends(&self, hotkey: &str, dividends: f64, take: f64) {
        let mut state = self.state.lock().unwrap();
        Self::register(&mut state, hotkey);
        state.dividends.insert(hotkey.to_string(), dividends);
        state.takes.insert(hotkey.to_string(), take);
    }

    pub fn set_stake_rao(&self, hotkey: &str, rao: u64) {
        let mut state = self.state.lock().unwrap();
        Self::register(&mut state, hotkey);
        state.stakes.insert(hotkey.to_string(), rao);
    }

    pub fn fail(&self, method: &'static str) {
        self.state.lock().unwrap().failing.insert(method);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().calls.get(method).copied().unwrap_or(0)
    }

    fn record(&self, method: &'static str) -> Result<(), RpcError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_insert(0) += 1;
        if state.failing.contains(method) {
            return Err(RpcError::Transport(format!("{} unavailable", method)));
        }
        Ok(())
    }
}

#[async_trait]
impl SubtensorRpc for FakeSubtensor {
    fn endpoint(&self) -> &str {
        "fake://subtensor"
    }

    async fn current_block(&self) -> Result<u64, RpcError> {
        self.record("current_block")?;
        Ok(self.head)
    }

    async fn dynamic_info(&self, netuid: u16, _block: Option<u64>) -> Result<DynamicInfo, RpcError> {
        self.record("dynamic_info")?;
        Ok(DynamicInfo {
            netuid,
            tempo: self.tempo,
            last_step: self.last_step,
        })
    }

    async fn metagraph(&self, netuid: u16, block: u64) -> Result<Metagraph, RpcError> {
        self.record("metagraph")?;
        let state = self.state.lock().unwrap();
        let alpha_dividends_per_hotkey = state
            .hotkeys
            .iter()
            .map(|h| (h.clone(), state.dividends.get(h).copied().unwrap_or(0.0)))
            .collect();
        Ok(Metagraph {
            netuid,
            block,
            alpha_dividends_per_hotkey,
        })
    }

    async fn uid_for_hotkey(&self, hotkey: &str, _netuid: u16, _block: u64) -> Result<Option<u16>, RpcError> {
        self.record("uid_for_hotkey")?;
        let state = self.state.lock().unwrap();
        Ok(state.hotkeys.iter().position(|h| h == hotkey).map(|uid| uid as u16))
    }

    async fn delegate_take(&self, hotkey: &str, _block: u64) -> Result<f64, RpcError> {
        self.record("delegate_take")?;
        Ok(self.state.lock().unwrap().takes.get(hotkey).copied().unwrap_or(0.0))
    }

    async fn total_hotkey_alpha(&self, hotkey: &str, _netuid: u16, _block: u64) -> Result<u64, RpcError> {
        self.record("total_hotkey_alpha")?;
        Ok(self.state.lock().unwrap().stakes.get(hotkey).copied().unwrap_or(0))
    }
}
