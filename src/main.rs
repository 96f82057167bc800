//! Transfer Engine - account-to-account transfer service
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌───────────┐
//! │ Gateway  │───▶│  Engine  │───▶│ AccountStore │    │ Publisher │
//! │ (axum)   │    │ (locks)  │    │ (mem / pg)   │    │ (log/...) │
//! └──────────┘    └────┬─────┘    └──────────────┘    └─────▲─────┘
//!                      └──────────── after commit ──────────┘
//! ```
//!
//! Usage: `transfer_engine [--env dev] [--port 8080]`

use transfer_engine::bootstrap::build_engine;
use transfer_engine::config::AppConfig;
use transfer_engine::gateway::run_server;
use transfer_engine::logging::init_logging;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        app_config.gateway.port = port;
    }
    let _log_guard = init_logging(&app_config);

    tracing::info!("Starting Transfer Engine in {} mode", env);

    let engine = build_engine(&app_config).await?;
    run_server(&app_config.gateway, engine).await
}
