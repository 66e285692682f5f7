//! restore_neighbors
//!
//! Runs once during a system warm reboot and exits. Exit code 1 means the
//! snapshot was malformed, the kernel refused an entry or a database was
//! unreachable; the completion flag is not set in that case.

use anyhow::Context;
use clap::Parser;
use sonic_restore_neighbors::{
    run_restore_neighbors, EthernetProbeBuilder, LinuxNeighborDriver, RawSocketTransmitter,
    RestoreEnvironment, RestoreRunStatus,
};
use sonic_warmrestart_common::{
    init_logging, CoordinatorConfig, DbId, RedisStateStore, StateDbWarmRestartGate, TokioClock,
    DEFAULT_CONFIG_PATH,
};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "restore_neighbors", about = "Restore kernel neighbors after a warm reboot")]
struct Args {
    /// Configuration file; defaults are used if it does not exist
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Override the restore deadline
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Override the interval between restore passes
    #[arg(long)]
    poll_interval_secs: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(args.verbose) {
        eprintln!("restore_neighbors: {e}");
        return ExitCode::from(1);
    }

    info!("restore_neighbors: Starting");
    match run(args).await {
        Ok(()) => {
            info!("restore_neighbors: Exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "restore_neighbors: Exiting with error");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = CoordinatorConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config))?;
    if let Some(secs) = args.deadline_secs {
        config.restore.deadline_secs = secs;
    }
    if let Some(secs) = args.poll_interval_secs {
        config.restore.poll_interval_secs = secs;
    }
    config.validate().context("validating command line overrides")?;

    let appl_db = RedisStateStore::connect(&config.database, DbId::ApplDb)
        .await
        .context("connecting to APPL_DB")?;
    let state_db = RedisStateStore::connect(&config.database, DbId::StateDb)
        .await
        .context("connecting to STATE_DB")?;
    let gate = StateDbWarmRestartGate::new(state_db.clone());

    let driver = LinuxNeighborDriver::new(config.restore.ip_path.clone());
    let env = RestoreEnvironment {
        driver: &driver,
        transmitter: &RawSocketTransmitter,
        builder: &EthernetProbeBuilder,
        clock: &TokioClock,
    };

    match run_restore_neighbors(appl_db, state_db, &gate, env, &config.restore).await? {
        RestoreRunStatus::Disabled | RestoreRunStatus::Skipped => {}
        RestoreRunStatus::Completed(summary) => {
            info!(
                passes = summary.passes,
                abandoned = summary.abandoned_entries,
                "Neighbor restore complete"
            );
        }
    }
    Ok(())
}
