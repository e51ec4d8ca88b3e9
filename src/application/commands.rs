//! CLI commands and handlers
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

use super::services::{AllocationService, ServiceConfig};
use crate::domain::yield_history::ApyQuery;
use crate::shared::errors::AppError;
use crate::shared::types::AllocationRequest;

#[derive(Parser, Debug)]
#[command(name = "poolalloc")]
#[command(version, about = "Greedy yield allocator for lending and staking pools")]
pub struct Cli {
    /// Path to config file (optional)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Ethereum mainnet JSON-RPC endpoint (overrides config)
    #[arg(long, global = true)]
    pub ethereum_url: Option<String>,

    /// Subtensor JSON-RPC endpoint (overrides config)
    #[arg(long, global = true)]
    pub bittensor_url: Option<String>,

    /// Share of total assets to allocate, in basis points (overrides config)
    #[arg(long, global = true)]
    pub threshold_bps: Option<u32>,

    /// Number of greedy steps (overrides config)
    #[arg(long, global = true)]
    pub increment_divisor: Option<u32>,

    /// Per-quote timeout in milliseconds (overrides config)
    #[arg(long, global = true)]
    pub quote_timeout_ms: Option<u64>,

    /// Entries per query cache (overrides config)
    #[arg(long, global = true)]
    pub cache_capacity: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Allocate the request's total assets across its pools
    Allocate {
        /// Request JSON file, or `-` for stdin
        #[arg(short, long)]
        request: PathBuf,

        /// Also print a human-readable table to stderr
        #[arg(long)]
        report: bool,
    },

    /// Trailing average APY of alpha staked to a hotkey
    Apy {
        #[arg(long)]
        netuid: u16,

        /// Validator hotkey (ss58)
        #[arg(long)]
        hotkey: String,

        #[arg(long)]
        start_block: u64,

        /// Defaults to the chain head
        #[arg(long)]
        end_block: Option<u64>,

        /// Interval in blocks, defaults to the subnet tempo
        #[arg(long)]
        interval: Option<u64>,

        /// Extra alpha assumed staked on top of the recorded stake
        #[arg(long, default_value_t = 0.0)]
        delta: f64,
    },
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, config: ServiceConfig) -> Result<(), AppError> {
        let service = AllocationService::new(config);
        match command {
            Commands::Allocate { request, report } => Self::execute_allocate_command(&service, &request, report).await,
            Commands::Apy {
                netuid,
                hotkey,
                start_block,
                end_block,
                interval,
                delta,
            } => {
                let query = ApyQuery {
                    hotkey,
                    netuid,
                    start_block,
                    end_block,
                    interval,
                    delta_alpha: delta,
                };
                Self::execute_apy_command(&service, &query).await
            }
        }
    }

    async fn execute_allocate_command(service: &AllocationService, path: &Path, show_report: bool) -> Result<(), AppError> {
        let request = load_request(path)?;
        let report = service.allocate(&request).await?;
        info!("Allocation {} complete", report.run_id);

        if show_report {
            eprintln!("{}", report.render());
        }
        let json = report
            .to_json()
            .map_err(|e| AppError::Unknown(format!("failed to encode report: {}", e)))?;
        println!("{}", json);
        Ok(())
    }

    async fn execute_apy_command(service: &AllocationService, query: &ApyQuery) -> Result<(), AppError> {
        let apy = service.estimate_apy(query).await?;
        info!("Average APY for {} on subnet {}: {}", query.hotkey, query.netuid, apy);
        println!(
            "{}",
            serde_json::json!({
                "hotkey": query.hotkey,
                "netuid": query.netuid,
                "start_block": query.start_block,
                "end_block": query.end_block,
                "apy": apy,
            })
        );
        Ok(())
    }
}

/// Read an allocation request from a file or stdin (`-`)
pub fn load_request(path: &Path) -> Result<AllocationRequest, AppError> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| AppError::InvalidRequest(format!("failed to read stdin: {}", e)))?;
        buf
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| AppError::InvalidRequest(format!("failed to read {}: {}", path.display(), e)))?
    };
    parse_request(&raw)
}

pub fn parse_request(raw: &str) -> Result<AllocationRequest, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::InvalidRequest(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_allocate() {
        let cli = Cli::parse_from([
            "poolalloc",
            "allocate",
            "--request",
            "req.json",
            "--ethereum-url",
            "http://localhost:8545",
            "--increment-divisor",
            "5",
        ]);
        assert_eq!(cli.ethereum_url.as_deref(), Some("http://localhost:8545"));
        assert_eq!(cli.increment_divisor, Some(5));
        assert!(matches!(cli.command, Commands::Allocate { report: false, .. }));
    }

    #[test]
    fn test_cli_parses_apy() {
        let cli = Cli::parse_from([
            "poolalloc",
            "apy",
            "--netuid",
            "18",
            "--hotkey",
            "5F4tQyWrhfGVcNhoqeiNsR6KjD4wMZ2kfhLj4oHYuyHbZAc3",
            "--start-block",
            "100",
        ]);
        match cli.command {
            Commands::Apy {
                netuid,
                end_block,
                delta,
                ..
            } => {
                assert_eq!(netuid, 18);
                assert_eq!(end_block, None);
                assert_eq!(delta, 0.0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_malformed_request_is_reported() {
        assert!(matches!(parse_request("{\"num_allocs\": 3}"), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn test_missing_request_file() {
        let err = load_request(Path::new("/nonexistent/request.json")).unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
