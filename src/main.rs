//! Climatizar CLI - central air-conditioning scheduler service
//!
//! Run the scheduling service over a durable fleet store, or show
//! version and configuration info.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

use climatizar::{
    api::{create_router, AppState},
    config::Config,
    error::{ClimatizarError, Result},
    intake::Intake,
    metrics::MetricsCollector,
    scheduler::{Scheduler, SchedulerConfig},
    status::StatusQuery,
    store::FleetStore,
};

/// Rooms provisioned on first start
const DEFAULT_ROOMS: std::ops::RangeInclusive<i64> = 101..=110;

/// Ambient temperature of a freshly provisioned room (tenths of a degree)
const DEFAULT_ENVIRONMENT_TEMP: i32 = 250;

/// Climatizar - central air-conditioning scheduler
#[derive(Parser)]
#[command(name = "climatizar")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduling service
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8099")]
        port: u16,

        /// Fleet store location (omit for an in-memory store)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Simulation step in seconds
        #[arg(long, default_value = "6")]
        tick_secs: u64,

        /// Check every provisioned room in for quick experimentation
        #[arg(long)]
        demo: bool,
    },
    /// Show version and configuration info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            store,
            tick_secs,
            demo,
        } => serve(&host, port, store, tick_secs, demo).await,
        Commands::Info => {
            println!("Climatizar v{}", climatizar::VERSION);
            println!("Central air-conditioning scheduler");
            println!();
            println!("Policy defaults:");
            let cfg = Config::default();
            println!("  - Tick period: {} s", cfg.tick_secs);
            println!("  - Sort phase every {} ticks", cfg.ticks_per_sort);
            println!(
                "  - Admissible targets: {}..={} (tenths of a degree)",
                cfg.min_target_temp, cfg.max_target_temp
            );
            println!(
                "  - Power-on defaults: {} / {} / {}",
                cfg.default_mode, cfg.default_speed, cfg.default_target_temp
            );
            Ok(())
        }
    }
}

async fn serve(
    host: &str,
    port: u16,
    store_path: Option<PathBuf>,
    tick_secs: u64,
    demo: bool,
) -> Result<()> {
    let config = Config {
        store_path: store_path.clone(),
        tick_secs,
        ..Config::default()
    };
    config.validate()?;

    let store = match &store_path {
        Some(path) => Arc::new(FleetStore::open(path)?),
        None => Arc::new(FleetStore::in_memory()),
    };
    for room_id in DEFAULT_ROOMS {
        store.provision_ac(room_id, DEFAULT_ENVIRONMENT_TEMP)?;
        if demo && store.active_bill(room_id).is_none() {
            store.check_in(room_id)?;
        }
    }

    let metrics = Arc::new(MetricsCollector::new());
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig::from(&config),
        Arc::clone(&store),
        Arc::clone(&metrics),
    ));
    let intake = Arc::new(Intake::new(
        Arc::clone(&store),
        Arc::clone(&scheduler),
        config.clone(),
    ));
    let status = Arc::new(StatusQuery::new(Arc::clone(&store), &config));
    let state = AppState::new(intake, status, Arc::clone(&scheduler), store, metrics);
    let app = create_router(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clock = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| ClimatizarError::InvalidParameter {
            reason: format!("invalid address: {e}"),
        })?;

    println!("Starting Climatizar scheduler service...");
    println!("Server listening on http://{addr}");
    println!();
    println!("Endpoints:");
    println!("  GET  /health             - Health check");
    println!("  GET  /metrics            - Prometheus metrics");
    println!("  PUT  /ac/:room_id        - Control a room's unit");
    println!("  GET  /ac/:room_id/status - Long-poll room status");
    println!("  GET  /admin/scheduler    - Operator queue snapshot");
    println!();
    println!("Example:");
    println!("  curl http://{addr}/health");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        ClimatizarError::InvalidParameter {
            reason: format!("failed to bind: {e}"),
        }
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .map_err(|e| ClimatizarError::StorePersist {
            reason: format!("server error: {e}"),
        })?;

    // the clock completes its current tick before exiting
    let _ = clock.await;
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let _ = tokio::signal::ctrl_c().await;
    println!("shutting down: stopping the clock after the current tick");
    let _ = shutdown_tx.send(true);
}
