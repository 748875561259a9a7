use std::sync::Arc;
use std::time::Duration;

use chunkrelay::api::{create_api_server, AppState};
use chunkrelay::events::EventBus;
use chunkrelay::staging::ChunkStaging;
use chunkrelay::store::Store;
use clap::Parser;
use tracing::{error, info};

const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
const STALE_AFTER: Duration = Duration::from_secs(3600);

#[derive(Parser, Debug)]
#[command(name = "chunkrelay-coordinator", version, about = "Chunked file-transfer coordinator")]
struct Args {
    #[arg(long, default_value = "0.0.0.0:8080", env = "CHUNKRELAY_BIND_ADDR")]
    bind_addr: String,

    #[arg(long, default_value = "chunkrelay.db", env = "CHUNKRELAY_DB_PATH")]
    db_path: String,

    #[arg(long, default_value = "./staging", env = "CHUNKRELAY_STAGING_DIR")]
    staging_dir: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chunkrelay=info,tower_http=info".into()),
        )
        .init();

    chunkrelay::metrics::init_metrics();

    let args = Args::parse();

    let store = Arc::new(
        Store::new(&format!("sqlite://{}?mode=rwc", args.db_path))
            .await
            .expect("failed to open store"),
    );
    let staging = Arc::new(ChunkStaging::new(&args.staging_dir));
    let events = Arc::new(EventBus::new());

    spawn_stale_sweeper(store.clone());

    let state = Arc::new(AppState::new(store, staging, events));
    let app = create_api_server(state);

    let listener = tokio::net::TcpListener::bind(&args.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", args.bind_addr));

    info!(addr = %args.bind_addr, "chunkrelay coordinator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

fn spawn_stale_sweeper(store: Arc<Store>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(STALE_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            let cutoff = chrono::Utc::now().timestamp() - STALE_AFTER.as_secs() as i64;
            match store.sweep_stale(cutoff).await {
                Ok(0) => {}
                Ok(n) => {
                    chunkrelay::metrics::record_transfers_swept_stale(n);
                    info!(count = n, "swept stale transfers");
                }
                Err(e) => error!(error = %e, "stale sweep failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("shutdown signal received");
}
