//! Data model for the proxy protocol and the host-facing message context

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// Proxy response envelope
// =============================================================================

/// Envelope codes the proxy reports as success.
///
/// 1000: success, 1001: success but login required, 1002: success with warning.
pub const SUCCESS_CODES: [&str; 3] = ["1000", "1001", "1002"];

/// Raw response envelope from the proxy: `{ code, message, data }`
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyEnvelope {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Successful proxy payload.
///
/// `value` is the envelope's `data` (or the whole envelope object when `data`
/// was absent). The original envelope code is kept as a diagnostic so the
/// login-required/warning nuance of 1001/1002 is not discarded.
#[derive(Debug, Clone)]
pub struct ProxyPayload {
    pub code: Option<String>,
    pub value: Value,
}

impl ProxyPayload {
    /// Decode the payload value into a typed response
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value)
    }
}

// =============================================================================
// Login flow
// =============================================================================

/// Proxy-issued handle for one in-progress login attempt
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// Session handle issued on QR issuance
    pub w_id: String,
    /// Device type the session was opened with (e.g. "mac", "ipad")
    pub device_type: String,
    /// Proxy line requested from the service
    pub proxy_line: String,
}

/// QR issuance result from `/v1/iPadLogin`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrLogin {
    pub w_id: String,
    pub qr_code_url: String,
}

/// Login polling status.
///
/// Transitions are monotonic within one session: waiting → need_verify →
/// logged_in, or waiting → logged_in directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginStatus {
    Waiting,
    #[serde(rename_all = "camelCase")]
    NeedVerify { verify_url: String },
    #[serde(rename_all = "camelCase")]
    LoggedIn {
        wc_id: String,
        nick_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        head_url: Option<String>,
    },
}

impl LoginStatus {
    /// Map a `/v1/getIPadLoginInfo` payload to a status.
    ///
    /// Unrecognized status strings map to `Waiting` so a proxy-side addition
    /// does not fail the poll.
    pub fn from_poll_payload(payload: &Value) -> Self {
        match payload.get("status").and_then(Value::as_str) {
            Some("logged_in") => LoginStatus::LoggedIn {
                wc_id: str_field(payload, "wcId"),
                nick_name: str_field(payload, "nickName"),
                head_url: payload
                    .get("headUrl")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            Some("need_verify") => LoginStatus::NeedVerify {
                verify_url: str_field(payload, "verifyUrl"),
            },
            _ => LoginStatus::Waiting,
        }
    }

    /// True once the session reached its terminal success state
    pub fn is_logged_in(&self) -> bool {
        matches!(self, LoginStatus::LoggedIn { .. })
    }
}

fn str_field(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// =============================================================================
// Account status / outbound receipts / contacts
// =============================================================================

/// Result of `/v1/account/status`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    #[serde(default = "default_true")]
    pub valid: bool,
    #[serde(default)]
    pub wc_id: Option<String>,
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub quota: Option<AccountQuota>,
}

fn default_true() -> bool {
    true
}

/// Per-day message quota reported by the proxy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuota {
    pub max_messages_per_day: u64,
    pub used_today: u64,
}

/// Receipt for a sent message (`/v1/sendText`, `/v1/sendImage2`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub msg_id: i64,
    pub new_msg_id: i64,
    pub create_time: i64,
}

/// Address book snapshot (`/v1/getAddressList`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactList {
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub chatrooms: Vec<String>,
}

// =============================================================================
// Inbound webhook events
// =============================================================================

/// Raw payload pushed by the proxy to the callback listener.
///
/// Ephemeral: lives only for the duration of one delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Numeric category code; arrives as a JSON string or number
    #[serde(deserialize_with = "string_or_number")]
    pub message_type: String,
    /// Account the event belongs to
    #[serde(default)]
    pub wc_id: String,
    /// Delivery timestamp (milliseconds)
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Opaque event payload
    #[serde(default)]
    pub data: Value,
}

/// Known fields inside an event's `data` payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventData {
    pub new_msg_id: Option<i64>,
    pub msg_id: Option<i64>,
    pub from_user: Option<String>,
    pub from_group: Option<String>,
    pub to_user: Option<String>,
    pub nick_name: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<i64>,
}

/// Whether a message came from a direct chat or a chatroom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageScope {
    Private,
    Group,
}

/// Semantic message payload kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    File,
    Unknown,
}

/// Inbound event category derived from the proxy's `messageType` code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A received chat message; the only category forwarded to the consumer
    Message {
        scope: MessageScope,
        kind: MessageKind,
    },
    /// Account login state changed on the proxy side
    LoginStatusChanged,
    /// Recognized delivery, but nothing the bridge forwards
    Other,
}

impl EventKind {
    /// Classify a proxy `messageType` code.
    ///
    /// Code families: `600xx` private message, `800xx` group message, with
    /// the last two digits selecting the payload kind; an unmapped kind
    /// still classifies as a message so it is forwarded rather than dropped.
    /// `30001`/`30002` report login-state changes.
    pub fn classify(code: &str) -> Self {
        let scope = match code.get(..3) {
            Some("600") if code.len() == 5 => Some(MessageScope::Private),
            Some("800") if code.len() == 5 => Some(MessageScope::Group),
            _ => None,
        };

        if let Some(scope) = scope {
            let kind = match &code[3..] {
                "01" => MessageKind::Text,
                "02" => MessageKind::Image,
                "03" => MessageKind::Voice,
                "04" => MessageKind::Video,
                "05" => MessageKind::File,
                _ => MessageKind::Unknown,
            };
            return EventKind::Message { scope, kind };
        }

        match code {
            "30001" | "30002" => EventKind::LoginStatusChanged,
            _ => EventKind::Other,
        }
    }
}

// =============================================================================
// Host-facing message context
// =============================================================================

/// A message participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Peer {
    pub id: String,
    pub name: String,
}

/// Message recipient (the bridged account)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub id: String,
}

/// Chatroom a group message arrived through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
}

/// Normalized inbound message handed to the host consumer.
///
/// Derived 1:1 from an [`InboundEvent`]; never persisted by the bridge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WechatMessageContext {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub sender: Peer,
    pub recipient: Recipient,
    pub content: String,
    pub timestamp: i64,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupRef>,
    /// Original `data` payload, passed through untouched
    pub raw: Value,
}

impl WechatMessageContext {
    /// Derive a context from an inbound event already classified as a message.
    ///
    /// Field derivation is deterministic except for the UUID fallback taken
    /// when the payload carries no message id at all.
    pub fn from_event(event: &InboundEvent, scope: MessageScope, kind: MessageKind) -> Self {
        let data: EventData = serde_json::from_value(event.data.clone()).unwrap_or_default();

        let id = data
            .new_msg_id
            .or(data.msg_id)
            .map(|id| id.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let sender_id = data.from_user.clone().unwrap_or_default();
        let sender_name = data.nick_name.clone().unwrap_or_else(|| sender_id.clone());

        let group = match scope {
            MessageScope::Group => data.from_group.clone().map(|id| GroupRef {
                name: id.clone(),
                id,
            }),
            MessageScope::Private => None,
        };

        let thread_id = group
            .as_ref()
            .map(|g| g.id.clone())
            .unwrap_or_else(|| sender_id.clone());

        let timestamp = data
            .timestamp
            .or(event.timestamp)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        Self {
            id,
            kind,
            sender: Peer {
                id: sender_id,
                name: sender_name,
            },
            recipient: Recipient {
                id: event.wc_id.clone(),
            },
            content: data.content.clone().unwrap_or_default(),
            timestamp,
            thread_id,
            group,
            raw: event.data.clone(),
        }
    }
}

// =============================================================================
// Serde helpers
// =============================================================================

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_message_codes() {
        assert_eq!(
            EventKind::classify("60001"),
            EventKind::Message {
                scope: MessageScope::Private,
                kind: MessageKind::Text
            }
        );
        assert_eq!(
            EventKind::classify("80002"),
            EventKind::Message {
                scope: MessageScope::Group,
                kind: MessageKind::Image
            }
        );
        // Unmapped kind inside a message family still classifies as a message
        assert_eq!(
            EventKind::classify("60099"),
            EventKind::Message {
                scope: MessageScope::Private,
                kind: MessageKind::Unknown
            }
        );
        assert_eq!(EventKind::classify("30001"), EventKind::LoginStatusChanged);
        assert_eq!(EventKind::classify("12345"), EventKind::Other);
        assert_eq!(EventKind::classify(""), EventKind::Other);
    }

    #[test]
    fn test_inbound_event_accepts_numeric_message_type() {
        let event: InboundEvent =
            serde_json::from_value(json!({"messageType": 60001, "wcId": "wxid_a", "data": {}}))
                .unwrap();
        assert_eq!(event.message_type, "60001");

        let event: InboundEvent =
            serde_json::from_value(json!({"messageType": "60001", "wcId": "wxid_a", "data": {}}))
                .unwrap();
        assert_eq!(event.message_type, "60001");
    }

    #[test]
    fn test_context_from_private_event() {
        let event: InboundEvent = serde_json::from_value(json!({
            "messageType": "60001",
            "wcId": "wxid_me",
            "timestamp": 1700000000000i64,
            "data": {
                "newMsgId": 123456789,
                "fromUser": "wxid_friend",
                "content": "hello",
                "timestamp": 1700000000123i64
            }
        }))
        .unwrap();

        let ctx =
            WechatMessageContext::from_event(&event, MessageScope::Private, MessageKind::Text);
        assert_eq!(ctx.id, "123456789");
        assert_eq!(ctx.kind, MessageKind::Text);
        assert_eq!(ctx.sender.id, "wxid_friend");
        assert_eq!(ctx.sender.name, "wxid_friend");
        assert_eq!(ctx.recipient.id, "wxid_me");
        assert_eq!(ctx.content, "hello");
        assert_eq!(ctx.timestamp, 1700000000123);
        assert_eq!(ctx.thread_id, "wxid_friend");
        assert!(ctx.group.is_none());
        assert_eq!(ctx.raw["newMsgId"], 123456789);
    }

    #[test]
    fn test_context_from_group_event() {
        let event: InboundEvent = serde_json::from_value(json!({
            "messageType": "80001",
            "wcId": "wxid_me",
            "data": {
                "newMsgId": 42,
                "fromGroup": "12345@chatroom",
                "fromUser": "wxid_member",
                "content": "hi all",
                "timestamp": 1700000000456i64
            }
        }))
        .unwrap();

        let ctx = WechatMessageContext::from_event(&event, MessageScope::Group, MessageKind::Text);
        assert_eq!(ctx.thread_id, "12345@chatroom");
        let group = ctx.group.expect("group ref");
        assert_eq!(group.id, "12345@chatroom");
        assert_eq!(ctx.sender.id, "wxid_member");
    }

    #[test]
    fn test_login_status_from_payload() {
        let status = LoginStatus::from_poll_payload(&json!({
            "status": "logged_in",
            "wcId": "wxid_me",
            "nickName": "Alice",
            "headUrl": "https://example.com/a.jpg"
        }));
        assert_eq!(
            status,
            LoginStatus::LoggedIn {
                wc_id: "wxid_me".to_string(),
                nick_name: "Alice".to_string(),
                head_url: Some("https://example.com/a.jpg".to_string()),
            }
        );

        let status = LoginStatus::from_poll_payload(&json!({
            "status": "need_verify",
            "verifyUrl": "https://example.com/verify"
        }));
        assert_eq!(
            status,
            LoginStatus::NeedVerify {
                verify_url: "https://example.com/verify".to_string()
            }
        );

        // Forward-compatible fallback: unrecognized statuses poll as waiting
        assert_eq!(
            LoginStatus::from_poll_payload(&json!({"status": "scanning"})),
            LoginStatus::Waiting
        );
        assert_eq!(
            LoginStatus::from_poll_payload(&json!({})),
            LoginStatus::Waiting
        );
    }

    #[test]
    fn test_envelope_code_accepts_number() {
        let env: ProxyEnvelope =
            serde_json::from_value(json!({"code": 1000, "data": {"ok": true}})).unwrap();
        assert_eq!(env.code.as_deref(), Some("1000"));
    }
}
