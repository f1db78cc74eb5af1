use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hostwatch::{
    LogCategory, LogLevel, SystemLogRecord,
    actors::{hub::HubHandle, jobs::build_scheduler},
    config::read_config_file,
    monitors::system::sysinfo_probe_factory,
    storage,
};
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// How long in-flight jobs may take to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init(log_level: &str) {
    let level = LevelFilter::from_str(log_level).unwrap_or_else(|_| {
        eprintln!("unknown log level '{log_level}', using info");
        LevelFilter::INFO
    });

    let filter = filter::Targets::new().with_targets(vec![
        ("hostwatch", level),
        ("hostwatch_hub", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = read_config_file(&args.file)?;
    init(&config.server.log_level);
    trace!("started with args: {args:?}");

    let store = storage::connect(&config.storage)
        .await
        .context("failed to open storage")?;

    let hub = HubHandle::spawn();

    let started = SystemLogRecord::new(
        LogLevel::Info,
        LogCategory::System,
        "monitoring hub started",
    );
    if let Err(e) = store.insert_log(&started).await {
        warn!("failed to write startup log: {e}");
    }

    let scheduler = build_scheduler(&config, store.clone(), hub.clone(), sysinfo_probe_factory())?;
    for (job, cadence) in scheduler.entries() {
        info!("scheduling {job}: {cadence:?}");
    }
    let scheduler = scheduler.spawn();

    #[cfg(feature = "api")]
    {
        use hostwatch::api::{ApiConfig, ApiState, spawn_api_server};

        let api_config = ApiConfig::from(&config.server);
        let addr = spawn_api_server(api_config, ApiState::new(store.clone(), hub.clone())).await?;
        info!("listening on {addr}");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    scheduler.shutdown(SHUTDOWN_GRACE).await;
    hub.shutdown();

    if let Err(e) = store.close().await {
        error!("failed to close storage: {e}");
    }

    Ok(())
}
