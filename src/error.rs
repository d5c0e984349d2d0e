//! Bridge error taxonomy

use std::net::SocketAddr;

/// Errors surfaced by the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Required setting missing or invalid at construction time
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network-level failure talking to the proxy
    #[error("proxy request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx HTTP response; `reason` carries the body's error message when
    /// one could be parsed, else a synthesized `HTTP <status>: <text>` line
    #[error("{reason}")]
    Status { status: u16, reason: String },

    /// Proxy envelope carried a non-success code.
    ///
    /// Display text is the envelope's `message` when present, else a
    /// code-derived fallback built by [`BridgeError::proxy`].
    #[error("{message}")]
    Proxy { code: String, message: String },

    /// Proxy response body did not match the expected shape
    #[error("malformed proxy response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Callback listener could not bind its port
    #[error("failed to bind callback listener on {addr}: {source}")]
    ListenerBind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Login polling exceeded the caller-supplied attempt limit
    #[error("login not completed after {attempts} poll attempts")]
    LoginTimeout { attempts: u32 },
}

impl BridgeError {
    /// Build a [`BridgeError::Proxy`] from an envelope code and optional message
    pub fn proxy(code: impl Into<String>, message: Option<String>) -> Self {
        let code = code.into();
        let message = match message {
            Some(m) if !m.is_empty() => m,
            _ => format!("Error: {}", code),
        };
        BridgeError::Proxy { code, message }
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_error_uses_envelope_message() {
        let err = BridgeError::proxy("1203", Some("账号未登录".to_string()));
        assert_eq!(err.to_string(), "账号未登录");
    }

    #[test]
    fn test_proxy_error_falls_back_to_code() {
        let err = BridgeError::proxy("9999", None);
        assert_eq!(err.to_string(), "Error: 9999");

        let err = BridgeError::proxy("9999", Some(String::new()));
        assert_eq!(err.to_string(), "Error: 9999");
    }

    #[test]
    fn test_login_timeout_is_distinct() {
        let err = BridgeError::LoginTimeout { attempts: 60 };
        assert!(matches!(err, BridgeError::LoginTimeout { attempts: 60 }));
    }
}
