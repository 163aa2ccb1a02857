//! crosspost-send - Background daemon for scheduled publishing
//!
//! Each tick refreshes expiring OAuth tokens, then reads every
//! registered schedule file and dispatches the posts that fall in the
//! upcoming posting window.

use clap::Parser;
use libcrosspost::logging::{LogFormat, LoggingConfig};
use libcrosspost::{Config, Database, PublishScheduler, Result, TokenRefresher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "crosspost-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled multi-platform publishing")]
#[command(long_about = "\
crosspost-send - Background daemon for scheduled publishing

DESCRIPTION:
    crosspost-send is a long-running daemon that publishes scheduled
    content to LinkedIn, X, and TikTok.

    On each tick it refreshes OAuth tokens that are about to expire,
    reads every registered per-user schedule file, and dispatches the
    rows whose scheduled time falls in the upcoming posting window.
    Publish units run concurrently and never delay the next tick.

USAGE:
    # Run in foreground (logs to stderr)
    crosspost-send

    # Run with custom poll interval
    crosspost-send --poll-interval 60

    # Enable verbose logging
    crosspost-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml
    (override with CROSSPOST_CONFIG)

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
")]
struct Cli {
    /// Path to the configuration file (overrides CROSSPOST_CONFIG)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to run a scheduling tick (default: 300)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run one tick and exit (for testing)
    #[arg(long, hide = true)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let db = Database::new(&config.database.path).await?;

    info!("crosspost-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(libcrosspost::PlatformError::from)?;

    let refresher = TokenRefresher::new(db.clone(), http.clone(), &config);
    let scheduler = PublishScheduler::new(db, http, &config);

    let poll_interval = cli.poll_interval.unwrap_or(config.scheduler.poll_interval);
    info!("Poll interval: {}s", poll_interval);

    if cli.once {
        run_tick(&refresher, &scheduler).await;
        info!("crosspost-send: ran one tick, exiting");
    } else {
        run_daemon_loop(&refresher, &scheduler, poll_interval, shutdown).await;
    }

    info!("crosspost-send daemon stopped");
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    let format = std::env::var("CROSSPOST_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);
    let level = std::env::var("CROSSPOST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    LoggingConfig::new(format, level, verbose).init();
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libcrosspost::CrosspostError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

/// Main daemon loop
async fn run_daemon_loop(
    refresher: &TokenRefresher,
    scheduler: &PublishScheduler,
    poll_interval: u64,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        run_tick(refresher, scheduler).await;

        // Sleep until next poll (check shutdown every second)
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}

/// One tick: refresh expiring tokens, then dispatch due posts. Errors
/// are logged, never fatal to the daemon.
async fn run_tick(refresher: &TokenRefresher, scheduler: &PublishScheduler) {
    if let Err(e) = refresher.run_once().await {
        error!("Token refresh pass failed: {}", e);
    }

    match scheduler.run_once().await {
        Ok(0) => {}
        Ok(n) => info!("Dispatched {} publish unit(s)", n),
        Err(e) => error!("Scheduler tick failed: {}", e),
    }
}
