//! ==============================================================================
//! main.rs - lora telemetry dashboard entry point
//! ==============================================================================
//!
//! purpose:
//!     hosts the live dashboard for two LoRa sensor nodes (P1, P2).
//!     a producer keeps overwriting latest.txt and appending to data.txt; this
//!     process polls both, keeps the latest reading per device, edge-triggers
//!     alerts into a persisted log and serves the result over http.
//!
//! responsibilities:
//!     - load dashboard.toml and initialise tracing
//!     - open the persisted alert log and build the session
//!     - serve the dashboard (web.rs)
//!     - run the fast and slow poll loops (scheduler.rs)
//!     - stop everything cleanly on ctrl-c or a fatal storage error
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │ fast loop   │  │ slow loop   │  │ web server          │  │
//!     │  │ (1s cycle)  │  │ (5s cycle)  │  │ (port 3000)         │  │
//!     │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │         │                │                    │             │
//!     │         └────────────────┼────────────────────┘             │
//!     │                          │                                  │
//!     │                    ┌─────┴─────┐                            │
//!     │                    │  session  │ <- session.rs              │
//!     │                    └─────┬─────┘                            │
//!     │   change detector, registry, alert detector, log, sink      │
//!     └──────────────────────────┼──────────────────────────────────┘
//!                                │
//!                    ┌───────────┴───────────┐
//!                    ▼                       ▼
//!             ┌─────────────┐         ┌─────────────┐
//!             │ latest.txt  │         │  data.txt   │
//!             │ (1 reading) │         │ (1 per line)│
//!             └─────────────┘         └─────────────┘
//!
//! ==============================================================================

use lora_dashboard::{config, log_store, scheduler, session, sink, source, web};

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  LoRa Telemetry Dashboard");
    println!("  \"Two nodes, one log, no duplicates\"");
    println!("===========================================================");

    // step 1: load configuration (optional path as first argument)
    let explicit = std::env::args().nth(1).map(PathBuf::from);
    let config = config::DashboardConfig::load_or_default(explicit.as_deref());
    config.print_summary();

    // step 2: logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // step 3: persisted log + session
    let store = log_store::FileStore::open(&config.storage.data_dir).with_context(|| {
        format!("Failed to open data directory {}", config.storage.data_dir.display())
    })?;
    let log = log_store::AlertLog::new(store, config.storage.log_key.clone(), config.storage.max_entries);
    let view = sink::DashboardSink::new();
    let mut session = session::DashboardSession::new(log, view.clone(), (&config).into());
    session.start();
    let session = Arc::new(Mutex::new(session));
    println!("[STARTUP] ✓ Alert log at {}", config.storage.data_dir.display());

    // step 4: start the web server in background
    let token = CancellationToken::new();
    let web_state = web::WebState { session: session.clone(), view };
    let bind = config.server.bind.clone();
    let mut web_task = tokio::spawn(async move {
        println!("[STARTUP] ✓ Dashboard live at http://{}", bind);
        web::run_server(&bind, web_state).await
    });

    // step 5: poll loops
    let timeout = Duration::from_millis(config.sources.timeout_ms);
    let latest = source::from_location(&config.sources.latest, timeout, true)?;
    let bulk = source::from_location(&config.sources.bulk, timeout, false)?;
    let intervals = scheduler::PollIntervals {
        fast: config.polling.fast_interval(),
        slow: config.polling.slow_interval(),
    };
    println!("\n[RUNTIME] Polling {} and {}", latest.describe(), bulk.describe());
    println!("────────────────────────────────────────────────────────────");
    let poller = scheduler::PollScheduler::start(session, latest, bulk, intervals, token.clone());

    let web_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested.");
            None
        }
        _ = token.cancelled() => None,
        joined = &mut web_task => Some(joined),
    };

    poller.shutdown().await?;
    println!("[SHUTDOWN] ✓ Poll loops stopped");

    match web_result {
        Some(joined) => {
            let served = joined.context("Web server task failed")?;
            if let Err(e) = &served {
                tracing::error!(error = %e, "Web server error.");
            }
            served?;
        }
        None => web_task.abort(),
    }
    Ok(())
}
