//! Configuration management

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Bridge configuration for one proxied account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    // =========================================================================
    // Proxy service credentials
    // =========================================================================
    /// Proxy service base URL (e.g. `http://localhost:3000/v1`)
    pub proxy_url: String,

    /// API key sent on every proxy call and expected on every callback
    pub api_key: String,

    /// Account identifier carried in the `X-Account-ID` header
    #[serde(default = "default_account_id")]
    pub account_id: String,

    /// Optional display name for the account
    pub name: Option<String>,

    // =========================================================================
    // Login flow
    // =========================================================================
    /// Device type used for QR issuance
    #[serde(default = "default_device_type")]
    pub device_type: String,

    /// Proxy line requested from the service
    #[serde(default = "default_proxy_line")]
    pub proxy_line: String,

    /// Seconds between login status polls
    #[serde(default = "default_login_poll_interval")]
    pub login_poll_interval_secs: u64,

    /// Poll attempts before the login flow gives up
    #[serde(default = "default_login_poll_attempts")]
    pub login_poll_max_attempts: u32,

    // =========================================================================
    // Callback listener
    // =========================================================================
    /// Bind host for the callback listener
    #[serde(default = "default_webhook_host")]
    pub webhook_host: String,

    /// Bind port for the callback listener
    #[serde(default = "default_webhook_port")]
    pub webhook_port: u16,

    /// Path the proxy pushes events to
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,

    /// Publicly reachable URL registered with the proxy.
    /// When unset, derived from host/port/path.
    pub webhook_public_url: Option<String>,
}

fn default_account_id() -> String {
    "default".to_string()
}

fn default_device_type() -> String {
    "mac".to_string()
}

fn default_proxy_line() -> String {
    "10".to_string()
}

fn default_login_poll_interval() -> u64 {
    3
}

fn default_login_poll_attempts() -> u32 {
    60
}

fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_port() -> u16 {
    18790
}

fn default_webhook_path() -> String {
    "/webhook/wechat".to_string()
}

impl BridgeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> BridgeResult<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let proxy_url = require_env("WECHAT_PROXY_URL")?;
        let api_key = require_env("WECHAT_PROXY_API_KEY")?;

        Ok(Self {
            proxy_url,
            api_key,
            account_id: env_or("WECHAT_ACCOUNT_ID", default_account_id),
            name: std::env::var("WECHAT_ACCOUNT_NAME").ok(),
            device_type: env_or("WECHAT_DEVICE_TYPE", default_device_type),
            proxy_line: env_or("WECHAT_PROXY_LINE", default_proxy_line),
            login_poll_interval_secs: env_parse_or(
                "LOGIN_POLL_INTERVAL_SECS",
                default_login_poll_interval,
            ),
            login_poll_max_attempts: env_parse_or(
                "LOGIN_POLL_MAX_ATTEMPTS",
                default_login_poll_attempts,
            ),
            webhook_host: env_or("WEBHOOK_HOST", default_webhook_host),
            webhook_port: env_parse_or("WEBHOOK_PORT", default_webhook_port),
            webhook_path: env_or("WEBHOOK_PATH", default_webhook_path),
            webhook_public_url: std::env::var("WEBHOOK_PUBLIC_URL").ok(),
        })
    }

    /// URL the proxy should push events to.
    ///
    /// Prefers the configured public URL (tunnels, reverse proxies); falls
    /// back to the listener's own host/port/path.
    pub fn webhook_url(&self) -> String {
        match &self.webhook_public_url {
            Some(url) => url.clone(),
            None => format!(
                "http://{}:{}{}",
                self.webhook_host, self.webhook_port, self.webhook_path
            ),
        }
    }

    /// One-line account summary with the API key redacted
    pub fn describe(&self) -> String {
        let key_preview: String = self.api_key.chars().take(8).collect();
        format!(
            "{} ({}) via {} [key {}…]",
            self.account_id,
            self.name.as_deref().unwrap_or("unnamed"),
            self.proxy_url,
            key_preview
        )
    }
}

fn require_env(key: &str) -> BridgeResult<String> {
    std::env::var(key)
        .map_err(|_| BridgeError::Configuration(format!("{} is required", key)))
        .and_then(|v| {
            if v.is_empty() {
                Err(BridgeError::Configuration(format!("{} is required", key)))
            } else {
                Ok(v)
            }
        })
}

fn env_or(key: &str, default: fn() -> String) -> String {
    std::env::var(key).unwrap_or_else(|_| default())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: fn() -> T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            proxy_url: "http://localhost:3000/v1".to_string(),
            api_key: "wc_live_test_xxxxxxxx".to_string(),
            account_id: "default".to_string(),
            name: Some("测试账号".to_string()),
            device_type: default_device_type(),
            proxy_line: default_proxy_line(),
            login_poll_interval_secs: default_login_poll_interval(),
            login_poll_max_attempts: default_login_poll_attempts(),
            webhook_host: default_webhook_host(),
            webhook_port: default_webhook_port(),
            webhook_path: default_webhook_path(),
            webhook_public_url: None,
        }
    }

    #[test]
    fn test_webhook_url_derived_from_listener() {
        let config = test_config();
        assert_eq!(
            config.webhook_url(),
            "http://0.0.0.0:18790/webhook/wechat"
        );
    }

    #[test]
    fn test_webhook_url_prefers_public_url() {
        let mut config = test_config();
        config.webhook_public_url = Some("https://abc.ngrok-free.app/webhook/wechat".to_string());
        assert_eq!(
            config.webhook_url(),
            "https://abc.ngrok-free.app/webhook/wechat"
        );
    }

    #[test]
    fn test_describe_redacts_api_key() {
        let description = test_config().describe();
        assert!(description.contains("wc_live_"));
        assert!(!description.contains("wc_live_test_xxxxxxxx"));
    }
}
