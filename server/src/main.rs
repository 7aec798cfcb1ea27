// server/src/main.rs

// Entry point for the clinic health-bot server: wires the record store,
// gateway client and text provider together, starts the notification
// scheduler, and serves the webhook API until SIGINT/SIGTERM.

use anyhow::Result;
use healthbot::services::cards::{CardProvider, OpenRouterCards};
use healthbot::services::gateway::{MessageGateway, WhatsAppGateway};
use healthbot::{Config, RecordStore};
use log::info;
use notification_service::{Jobs, Scheduler};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};

mod api;

async fn handle_signals() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to set up SIGTERM handler: {}", e);
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to set up SIGINT handler: {}", e);
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::from_env()?;
    let cipher = config.field_cipher()?;
    let store = Arc::new(RecordStore::open(&config.data_dir, cipher)?);
    let gateway: Arc<dyn MessageGateway> =
        Arc::new(WhatsAppGateway::new(&config.wa_service_url, config.wa_service_api_key.clone())?);
    let cards: Arc<dyn CardProvider> = Arc::new(OpenRouterCards::new(&config.openrouter_api_key)?);

    let jobs = Arc::new(Jobs::new(store.clone(), gateway.clone(), cards));
    let scheduler = Scheduler::new(
        jobs.clone(),
        config.sweep_interval,
        config.diary_nudge_time,
        config.birthday_check_time,
    );
    let job_handles = scheduler.spawn();

    let state = api::AppState {
        store,
        gateway,
        jobs,
        webhook_token: config.webhook_token.clone(),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!("Health bot listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(handle_signals())
        .await?;

    for handle in job_handles {
        handle.abort();
    }
    Ok(())
}
