pub mod config;
pub mod errors;
pub mod event;
pub mod influx;
pub mod metrics_defs;
pub mod normalize;
pub mod relay;
pub mod sink;
pub mod stathat;
pub mod webhook;

#[cfg(test)]
mod testutils;

use errors::RelayError;
use relay::MetricsRelay;
use shared::admin_service::AdminService;
use shared::http::serve_listener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use webhook::WebhookService;

/// Serve the webhook and admin listeners until either one fails.
pub async fn run(config: config::Config) -> Result<(), RelayError> {
    let relay = MetricsRelay::from_config(&config.backends)?;
    if !relay.is_enabled() {
        tracing::warn!("No metrics backend is enabled, webhook events will be dropped");
    }

    let ready = Arc::new(AtomicBool::new(false));

    let webhook_listener = bind(&config.listener).await?;
    let admin_listener = bind(&config.admin_listener).await?;

    let is_ready = ready.clone();
    let webhook_task = serve_listener(webhook_listener, WebhookService::new(relay, &config.webhook));
    let admin_task = serve_listener(
        admin_listener,
        AdminService::new(move || is_ready.load(Ordering::Relaxed)),
    );

    ready.store(true, Ordering::Relaxed);
    tokio::try_join!(webhook_task, admin_task)?;
    Ok(())
}

async fn bind(listener: &config::Listener) -> Result<TcpListener, RelayError> {
    let bound = TcpListener::bind(format!("{}:{}", listener.host, listener.port)).await?;
    tracing::info!("Listening on {}", bound.local_addr()?);
    Ok(bound)
}
