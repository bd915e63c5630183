//! rain-watch: short-term rain alerts from Buienradar and Buienalarm.
//!
//! Single-binary Tokio application that:
//! 1. Polls both providers for the watched location on their 5-minute grid
//! 2. Combines them slot by slot into a rain verdict with confidence
//! 3. Publishes the current state and the next confirmed change as JSON lines
//! 4. Re-checks periodically, on `trigger` from stdin, and when a change is due

mod config;

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use buienalarm_client::Buienalarm;
use buienradar_client::Buienradar;
use common::config::WatchConfig;
use common::{Error, RainEvent};
use forecast_source::{ForecastSource, RetryingFetcher};
use rain_engine::{Publisher, RainEngine, RainMonitor, ScanPlan, TriggerHandle};

/// Rain alerts from Dutch precipitation nowcasts
#[derive(Parser)]
#[command(name = "rain-watch", about = "Rain alerts from Buienradar and Buienalarm")]
struct Cli {
    /// Run a single forced check, print the events, and exit.
    #[arg(long)]
    once: bool,

    /// Latitude override.
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude override.
    #[arg(long, allow_hyphen_values = true)]
    lng: Option<f64>,

    /// Config file (defaults to ./config.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
}

type Radar = ForecastSource<Buienradar, RetryingFetcher>;
type Alarm = ForecastSource<Buienalarm, RetryingFetcher>;

fn build_engine(cfg: &WatchConfig, publisher: Publisher) -> Result<RainEngine<Radar, Alarm>, Error> {
    let location = cfg.location()?;
    let fetcher = RetryingFetcher::new(&cfg.fetch)?;
    let zone = cfg.providers.clock_zone()?;

    let radar = ForecastSource::new(Buienradar::new(zone), fetcher.clone(), location);
    let alarm = ForecastSource::new(Buienalarm::new(zone), fetcher, location);

    Ok(RainEngine::new(
        radar,
        alarm,
        ScanPlan::from(&cfg.engine),
        publisher,
    ))
}

fn print_event(event: &RainEvent) {
    println!("{}", event.to_message());
}

/// Forward `trigger` lines from stdin to the monitor.
///
/// Runs on a plain thread: a blocking stdin read must not hold up runtime
/// shutdown.
fn spawn_stdin_triggers(trigger: TriggerHandle) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("stdin read failed, no more triggers: {}", e);
                    return;
                }
            };
            match line.trim() {
                "" => {}
                "trigger" | "check" => {
                    if !trigger.trigger_now() {
                        return;
                    }
                }
                other => warn!("unknown command {:?} (expected \"trigger\")", other),
            }
        }
        debug!("stdin closed");
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    // Events go to stdout; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rain_watch=info,rain_engine=info,forecast_source=info,\
                 buienradar_client=info,buienalarm_client=info"
                    .into()
            }),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("🌧️  rain-watch starting up...");

    let cfg = match config::load_config(cli.config.as_deref(), cli.lat, cli.lng) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (publisher, mut events) = Publisher::channel();
    let mut engine = match build_engine(&cfg, publisher) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Location: {}, {} | horizon {}m in {}m slots | check every {}s",
        cfg.latitude.unwrap_or_default(),
        cfg.longitude.unwrap_or_default(),
        cfg.engine.horizon_minutes,
        cfg.engine.slot_minutes,
        cfg.timing.rain_check_interval_secs
    );

    if cli.once {
        let published = engine.check_rain(true).await;
        drop(engine);
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
        return if published.is_some() {
            ExitCode::SUCCESS
        } else {
            error!("No source produced a forecast");
            ExitCode::FAILURE
        };
    }

    let monitor = RainMonitor::new(engine, &cfg.timing);
    spawn_stdin_triggers(monitor.trigger_handle());

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_task = tokio::spawn(monitor.run(shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
    let _ = shutdown_tx.send(true);

    if let Err(e) = monitor_task.await {
        error!("Rain monitor task failed: {}", e);
    }
    // The monitor owned the publisher; the printer drains and ends.
    if let Err(e) = printer.await {
        error!("Event printer task failed: {}", e);
    }

    info!("rain-watch stopped");
    ExitCode::SUCCESS
}
