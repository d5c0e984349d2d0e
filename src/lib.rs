//! WeChat Proxy Bridge Library
//!
//! Bridges a host messaging runtime to a third-party WeChat-automation proxy.
//!
//! # Architecture
//!
//! ```text
//! Proxy Service ──HTTP push──▶ Callback Listener ──normalize──▶ host consumer
//!       ▲
//!       │ HTTPS (X-API-Key / X-Account-ID)
//!       │
//! Proxy Client ◀── Login Flow / outbound sends / webhook registration
//! ```
//!
//! # Usage
//!
//! ## Logging in and receiving messages
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wechat_bridge::prelude::*;
//!
//! # async fn run() -> Result<(), wechat_bridge::BridgeError> {
//! let config = BridgeConfig::from_env()?;
//! let client = ProxyClient::new(&config)?;
//!
//! // QR login
//! let flow = LoginFlow::begin(&client, &LoginOptions::from_config(&config)).await?;
//! println!("scan: {}", flow.qr_code_url());
//! flow.wait_for_login(Duration::from_secs(3), 60, |status| {
//!     println!("status: {:?}", status);
//! })
//! .await?;
//!
//! // Receive pushed events
//! client.register_webhook(&config.webhook_url()).await?;
//! let handle = CallbackServer::start(
//!     CallbackConfig::from_bridge(&config),
//!     Arc::new(|message: WechatMessageContext| {
//!         println!("inbound: {} from {}", message.content, message.sender.id);
//!     }),
//! )
//! .await?;
//!
//! // Send
//! let target = normalize_target("group:12345@chatroom");
//! client.send_text_to(&target, "hello").await?;
//!
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod login;
pub mod proxy_api;
pub mod target;
pub mod types;

pub use callback::{CallbackConfig, CallbackHandle, CallbackServer, MessageConsumer};
pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use login::{LoginFlow, LoginOptions};
pub use proxy_api::ProxyClient;
pub use target::{looks_like_id, normalize_target, RecipientTarget};
pub use types::*;

/// Prelude for common imports
pub mod prelude {
    pub use crate::callback::{CallbackConfig, CallbackHandle, CallbackServer, MessageConsumer};
    pub use crate::config::BridgeConfig;
    pub use crate::error::{BridgeError, BridgeResult};
    pub use crate::login::{LoginFlow, LoginOptions};
    pub use crate::proxy_api::ProxyClient;
    pub use crate::target::{looks_like_id, normalize_target, RecipientTarget};
    pub use crate::types::*;
}
