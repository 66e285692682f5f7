//! bgp_eoiu_marker
//!
//! Runs once per BGP warm restart and exits. Exit code 1 means the peer list
//! could not be obtained or STATE_DB was unreachable.

use anyhow::Context;
use clap::Parser;
use sonic_bgp_eoiu_marker::{run_eoiu_marker, EoiuRunStatus, VtyshClient};
use sonic_warmrestart_common::{
    init_logging, CoordinatorConfig, DbId, RedisStateStore, StateDbWarmRestartGate, TokioClock,
    DEFAULT_CONFIG_PATH,
};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "bgp_eoiu_marker", about = "Mark BGP end-of-initial-update in STATE_DB")]
struct Args {
    /// Configuration file; defaults are used if it does not exist
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the EOR wait deadline
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Override the EOR poll interval
    #[arg(long)]
    poll_interval_secs: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(args.verbose) {
        eprintln!("bgp_eoiu_marker: {e}");
        return ExitCode::from(1);
    }

    info!("bgp_eoiu_marker: Starting");
    match run(args).await {
        Ok(()) => {
            info!("bgp_eoiu_marker: Exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "bgp_eoiu_marker: Exiting with error");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = CoordinatorConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config))?;
    if let Some(secs) = args.deadline_secs {
        config.eoiu.deadline_secs = secs;
    }
    if let Some(secs) = args.poll_interval_secs {
        config.eoiu.poll_interval_secs = secs;
    }
    config.validate().context("validating command line overrides")?;

    let state_db = RedisStateStore::connect(&config.database, DbId::StateDb)
        .await
        .context("connecting to STATE_DB")?;
    let gate = StateDbWarmRestartGate::new(state_db.clone());
    let client = VtyshClient::new(config.eoiu.vtysh_path.clone());

    let status = run_eoiu_marker(&client, state_db, &gate, &TokioClock, &config.eoiu).await?;
    match status {
        EoiuRunStatus::Disabled => {}
        EoiuRunStatus::Completed(outcome) if outcome.is_complete() => {
            info!(families = ?outcome.reached, "BGP EOIU reached for all families");
        }
        EoiuRunStatus::Completed(outcome) => {
            warn!(
                reached = ?outcome.reached,
                timed_out = ?outcome.timed_out,
                "BGP EOIU incomplete, consumer falls back to its own timer"
            );
        }
    }
    Ok(())
}
