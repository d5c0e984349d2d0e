//! Proxy API client
//!
//! Stateless request/response wrapper over the WeChat-automation proxy.
//! Every call posts JSON with the account's credentials in headers and
//! normalizes the `{ code, message, data }` envelope into typed results.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::target::RecipientTarget;
use crate::types::{
    AccountStatus, ContactList, LoginStatus, ProxyEnvelope, ProxyPayload, QrLogin, SendReceipt,
    SUCCESS_CODES,
};

// =============================================================================
// Endpoints
// =============================================================================

const STATUS_ENDPOINT: &str = "/v1/account/status";
const QR_LOGIN_ENDPOINT: &str = "/v1/iPadLogin";
const LOGIN_INFO_ENDPOINT: &str = "/v1/getIPadLoginInfo";
const SEND_TEXT_ENDPOINT: &str = "/v1/sendText";
const SEND_IMAGE_ENDPOINT: &str = "/v1/sendImage2";
const CONTACTS_ENDPOINT: &str = "/v1/getAddressList";
const WEBHOOK_REGISTER_ENDPOINT: &str = "/v1/webhook/register";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Client
// =============================================================================

/// Proxy API client.
///
/// Holds no session state between calls; the account identity travels as
/// `X-API-Key` / `X-Account-ID` headers on every request.
#[derive(Clone)]
pub struct ProxyClient {
    api_key: String,
    account_id: String,
    base_url: String,
    http: Client,
}

impl ProxyClient {
    /// Create a client from bridge configuration
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        if config.proxy_url.is_empty() {
            return Err(BridgeError::Configuration(
                "proxy base URL is required".to_string(),
            ));
        }

        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            account_id: config.account_id.clone(),
            base_url: config.proxy_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Issue one proxy call and normalize its envelope
    async fn request(&self, endpoint: &str, body: Option<Value>) -> BridgeResult<ProxyPayload> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("POST {}", url);

        let mut req = self
            .http
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .header("X-Account-ID", &self.account_id);
        if let Some(body) = &body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(failure_from_response(status, &text));
        }

        parse_success_body(&text)
    }

    // ===== Account Status =====

    /// Account validity, login state and quota
    pub async fn get_status(&self) -> BridgeResult<AccountStatus> {
        let payload = self.request(STATUS_ENDPOINT, None).await?;
        Ok(payload.decode()?)
    }

    // ===== Login Flow =====

    /// Open a login session and obtain its QR code
    pub async fn get_qr_code(&self, device_type: &str, proxy_line: &str) -> BridgeResult<QrLogin> {
        let payload = self
            .request(
                QR_LOGIN_ENDPOINT,
                Some(serde_json::to_value(QrLoginRequest {
                    device_type,
                    proxy: proxy_line,
                })?),
            )
            .await?;
        Ok(payload.decode()?)
    }

    /// Poll the login status of an open session
    pub async fn check_login(&self, w_id: &str) -> BridgeResult<LoginStatus> {
        let payload = self
            .request(
                LOGIN_INFO_ENDPOINT,
                Some(serde_json::to_value(CheckLoginRequest { w_id })?),
            )
            .await?;
        Ok(LoginStatus::from_poll_payload(&payload.value))
    }

    // ===== Message Sending =====

    /// Send a text message to a user or chatroom id
    pub async fn send_text(&self, wc_id: &str, content: &str) -> BridgeResult<SendReceipt> {
        let payload = self
            .request(
                SEND_TEXT_ENDPOINT,
                Some(serde_json::to_value(SendTextRequest { wc_id, content })?),
            )
            .await?;
        Ok(payload.decode()?)
    }

    /// Send an image by URL to a user or chatroom id
    pub async fn send_image(&self, wc_id: &str, image_url: &str) -> BridgeResult<SendReceipt> {
        let payload = self
            .request(
                SEND_IMAGE_ENDPOINT,
                Some(serde_json::to_value(SendImageRequest { wc_id, image_url })?),
            )
            .await?;
        Ok(payload.decode()?)
    }

    /// Send text to a normalized recipient target
    pub async fn send_text_to(
        &self,
        target: &RecipientTarget,
        content: &str,
    ) -> BridgeResult<SendReceipt> {
        self.send_text(target.id(), content).await
    }

    /// Send an image to a normalized recipient target
    pub async fn send_image_to(
        &self,
        target: &RecipientTarget,
        image_url: &str,
    ) -> BridgeResult<SendReceipt> {
        self.send_image(target.id(), image_url).await
    }

    // ===== Contacts =====

    /// Fetch the friend and chatroom lists
    pub async fn get_contacts(&self, wc_id: &str) -> BridgeResult<ContactList> {
        let payload = self
            .request(
                CONTACTS_ENDPOINT,
                Some(serde_json::to_value(ContactsRequest { wc_id })?),
            )
            .await?;
        Ok(payload.decode()?)
    }

    // ===== Webhook =====

    /// Register the callback URL the proxy should push events to
    pub async fn register_webhook(&self, webhook_url: &str) -> BridgeResult<()> {
        self.request(
            WEBHOOK_REGISTER_ENDPOINT,
            Some(serde_json::to_value(RegisterWebhookRequest { webhook_url })?),
        )
        .await?;
        Ok(())
    }
}

// =============================================================================
// Envelope handling
// =============================================================================

/// Map a 2xx body to a payload or a proxy-coded error
fn parse_success_body(text: &str) -> BridgeResult<ProxyPayload> {
    let raw: Value = serde_json::from_str(text)?;
    let envelope: ProxyEnvelope = serde_json::from_value(raw.clone())?;

    match envelope.code {
        Some(code) if SUCCESS_CODES.contains(&code.as_str()) => Ok(ProxyPayload {
            value: envelope.data.unwrap_or(raw),
            code: Some(code),
        }),
        Some(code) => Err(BridgeError::proxy(code, envelope.message)),
        // No envelope code at all: pass the body through as-is
        None => Ok(ProxyPayload {
            code: None,
            value: raw,
        }),
    }
}

/// Build the error for a non-2xx response
fn failure_from_response(status: StatusCode, text: &str) -> BridgeError {
    let reason = serde_json::from_str::<ProxyEnvelope>(text)
        .ok()
        .and_then(|env| env.error.or(env.message))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        });

    BridgeError::Status {
        status: status.as_u16(),
        reason,
    }
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QrLoginRequest<'a> {
    device_type: &'a str,
    proxy: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckLoginRequest<'a> {
    w_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendTextRequest<'a> {
    wc_id: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendImageRequest<'a> {
    wc_id: &'a str,
    image_url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactsRequest<'a> {
    wc_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterWebhookRequest<'a> {
    webhook_url: &'a str,
}
