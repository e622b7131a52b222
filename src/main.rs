//! EDGETRACK — prediction-market edge tracker.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the tracked markets from disk and serves the dashboard until
//! Ctrl+C, saving state on the way out.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use edgetrack::config;
use edgetrack::dashboard::{self, routes::DashboardState};
use edgetrack::engine::Tracker;
use edgetrack::platforms::manifold::ManifoldClient;
use edgetrack::storage::FileStore;

const BANNER: &str = r#"
 _____ ____   ____ _____ _____ ____      _    ____ _  __
| ____|  _ \ / ___| ____|_   _|  _ \    / \  / ___| |/ /
|  _| | | | | |  _|  _|   | | | |_) |  / _ \| |   | ' /
| |___| |_| | |_| | |___  | | |  _ <  / ___ \ |___| . \
|_____|____/ \____|_____| |_| |_| \_\/_/   \_\____|_|\_\

  Prediction-market edge tracker with Kelly sizing
"#;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cfg = config::AppConfig::load_or_default(CONFIG_PATH)?;

    println!("{BANNER}");
    info!(
        name = %cfg.tracker.name,
        default_bet = %cfg.tracker.default_bet,
        dry_run = cfg.tracker.dry_run,
        state_file = %cfg.storage.path,
        "EDGETRACK starting up"
    );

    // -- Components ------------------------------------------------------

    let store = Arc::new(FileStore::open(&cfg.storage.path)?);
    let platform = Arc::new(ManifoldClient::new(
        Some(cfg.manifold.base_url.clone()),
        cfg.manifold.timeout_secs,
    )?);

    let tracker = Tracker::new(platform, store, cfg.tracker_settings())
        .with_api_key(cfg.resolve_api_key());

    let state = Arc::new(DashboardState::new(tracker, cfg.manifold.search_limit));

    // -- Serve -----------------------------------------------------------

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received.");
    };

    dashboard::run_dashboard(
        Arc::clone(&state),
        &cfg.dashboard.host,
        cfg.dashboard.port,
        shutdown,
    )
    .await?;

    let tracker = state.tracker.lock().await;
    tracker.persist();
    info!(
        tracked = tracker.estimates().len(),
        rows = tracker.rows().len(),
        "EDGETRACK shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("edgetrack=info"));

    let json_logging = std::env::var("EDGETRACK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
