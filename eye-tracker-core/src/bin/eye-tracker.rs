use std::sync::Arc;

use clap::Parser;
use eye_config::ConfigStore;
use eye_tracker_core::{router, AppState, Orchestrator};
use parking_lot::Mutex;

#[derive(Parser, Debug)]
#[command(name = "eye-tracker", about = "Real-time eye-tracking backend")]
struct Cli {
    /// Address the REST control plane binds to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port the REST control plane binds to.
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

fn config_path() -> std::path::PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("."))
        .join("eye_tracker_config.json")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = env_tracing_logger::init();
    let cli = Cli::parse();

    let store = ConfigStore::open(config_path())?;
    let _watcher = eye_config::watch(store.clone())?;

    let orchestrator = Arc::new(Mutex::new(Orchestrator::new(store.clone())));
    orchestrator.lock().start();

    let state = AppState { store, orchestrator };
    let app = router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    tracing::info!(%addr, "eye-tracker listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
