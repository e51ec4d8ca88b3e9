//! Allocation report returned to the caller

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

use crate::domain::allocation::AllocationOutcome;
use crate::shared::types::{serialize_allocations, Amount, PoolAllocation, BASE_DECIMALS};
use crate::shared::utils::{self, format_amount};

#[derive(Debug, Clone, Serialize)]
pub struct AllocationReport {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    pub user_address: String,
    pub total_assets: Amount,

    /// Pool id -> amount, in request order
    #[serde(serialize_with = "serialize_allocations")]
    pub allocations: Vec<PoolAllocation>,
    pub total_allocated: Amount,
    pub unallocated: Amount,

    pub rounds: u32,
    pub incomplete: bool,
    pub timestamp: DateTime<Utc>,
}

impl AllocationReport {
    pub fn new(outcome: AllocationOutcome, user_address: &str, request_type: Option<String>) -> Self {
        Self {
            run_id: utils::generate_id(),
            request_type,
            user_address: user_address.to_string(),
            total_assets: outcome.total_assets,
            total_allocated: outcome.total_allocated(),
            unallocated: outcome.unallocated(),
            rounds: outcome.rounds,
            incomplete: outcome.incomplete,
            allocations: outcome.allocations,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text table of the allocation
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Allocation {} ({})", self.run_id, self.timestamp.to_rfc3339());
        let _ = writeln!(out, "User: {}", self.user_address);
        let _ = writeln!(out, "Total assets: {}", format_amount(self.total_assets, BASE_DECIMALS));
        let _ = writeln!(out, "{:<50} {:>28} {:>8}", "pool", "amount", "share");
        for allocation in &self.allocations {
            let _ = writeln!(
                out,
                "{:<50} {:>28} {:>7.2}%",
                allocation.address,
                format_amount(allocation.amount, BASE_DECIMALS),
                share(allocation.amount, self.total_assets)
            );
        }
        let _ = writeln!(
            out,
            "Allocated {} in {} rounds, {} unallocated",
            format_amount(self.total_allocated, BASE_DECIMALS),
            self.rounds,
            format_amount(self.unallocated, BASE_DECIMALS)
        );
        if self.incomplete {
            let _ = writeln!(out, "WARNING: no pool returned a valid quote, allocation is partial");
        }
        out
    }
}

fn share(amount: Amount, total: Amount) -> f64 {
    if total == 0 {
        return 0.0;
    }
    amount as f64 / total as f64 * 100.0
}
