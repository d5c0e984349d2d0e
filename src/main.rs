//! WeChat Proxy Bridge - Main Entry Point
//!
//! Standalone bridge runner:
//! 1. Probes the account and, when needed, drives the QR login flow
//! 2. Registers the callback URL with the proxy
//! 3. Serves the callback listener and logs normalized inbound messages

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod callback;
mod config;
mod error;
mod login;
mod proxy_api;
mod target;
mod types;

use callback::{CallbackConfig, CallbackServer};
use config::BridgeConfig;
use login::{LoginFlow, LoginOptions};
use proxy_api::ProxyClient;
use types::{LoginStatus, WechatMessageContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wechat_bridge=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 WeChat proxy bridge starting...");

    // Load configuration
    let config = BridgeConfig::from_env()?;
    info!("📋 Account: {}", config.describe());

    let client = ProxyClient::new(&config)?;

    // Probe the account; log in when the proxy reports no session
    let status = client.get_status().await?;
    if status.is_logged_in {
        info!(
            "✅ Already logged in as {}",
            status.nick_name.as_deref().unwrap_or("unknown")
        );
    } else {
        run_login_flow(&client, &config).await?;
    }

    // Point the proxy at our listener
    let webhook_url = config.webhook_url();
    client.register_webhook(&webhook_url).await?;
    info!("🔗 Webhook registered: {}", webhook_url);

    // Serve inbound events
    let handle = CallbackServer::start(
        CallbackConfig::from_bridge(&config),
        Arc::new(log_message),
    )
    .await?;
    info!("🌐 Listening for proxy events on port {}", handle.port());

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("📢 Shutdown signal received"),
        Err(err) => warn!("Unable to listen for shutdown signal: {}", err),
    }

    info!("🛑 Stopping callback listener...");
    let metrics = handle.metrics();
    handle.stop().await;
    info!(
        "✅ Bridge stopped ({} received, {} forwarded, {} rejected)",
        metrics.received,
        metrics.forwarded,
        metrics.rejected_auth + metrics.rejected_parse
    );
    Ok(())
}

/// Drive one QR login attempt to completion
async fn run_login_flow(client: &ProxyClient, config: &BridgeConfig) -> Result<()> {
    let flow = LoginFlow::begin(client, &LoginOptions::from_config(config)).await?;
    info!("📱 Scan to log in: {}", flow.qr_code_url());

    let status = flow
        .wait_for_login(
            Duration::from_secs(config.login_poll_interval_secs),
            config.login_poll_max_attempts,
            |status| match status {
                LoginStatus::Waiting => {}
                LoginStatus::NeedVerify { verify_url } => {
                    warn!("🔐 Verification required: {}", verify_url);
                }
                LoginStatus::LoggedIn {
                    wc_id, nick_name, ..
                } => {
                    info!("✅ Logged in as {} ({})", nick_name, wc_id);
                }
            },
        )
        .await?;

    debug_assert!(status.is_logged_in());
    Ok(())
}

/// Default consumer: log each normalized message as JSON
fn log_message(message: WechatMessageContext) {
    match serde_json::to_string(&message) {
        Ok(json) => info!("📩 {}", json),
        Err(e) => warn!("Failed to serialize inbound message: {}", e),
    }
}
