mod backend;
mod config;
mod export;
mod gui;
mod network;
mod paths;
mod render;

use std::sync::Arc;

use tracing::error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use gui::app;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "traceroute_visualization=info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() {
    init_tracing();
    let config = AppConfig::load();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return;
        }
    };
    app::main(rt, config);
}
