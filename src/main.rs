use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use poolalloc::app;
use poolalloc::application::Cli;
use poolalloc::config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Priority: CLI args > Config file > Defaults
    let base_config = match &cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::default(),
    };
    let app_cfg = app::AppCfg::from_config(base_config).with_cli_overrides(&cli);

    app::run(app_cfg, cli.command).await
}
