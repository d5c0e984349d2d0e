//! Login flow controller
//!
//! Drives the QR login sequence: issue a QR code, then poll the session
//! until the account is logged in. Polling cadence and cancellation belong
//! to the caller; the controller owns no background timer.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::proxy_api::ProxyClient;
use crate::types::{LoginSession, LoginStatus};

/// QR issuance options
#[derive(Debug, Clone)]
pub struct LoginOptions {
    pub device_type: String,
    pub proxy_line: String,
}

impl LoginOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            device_type: config.device_type.clone(),
            proxy_line: config.proxy_line.clone(),
        }
    }
}

/// One QR login attempt against the proxy.
///
/// Created by [`LoginFlow::begin`]; holds the proxy-issued session handle.
/// A failed QR issuance is fatal for the attempt — callers restart by
/// calling `begin` again.
pub struct LoginFlow<'a> {
    client: &'a ProxyClient,
    session: LoginSession,
    qr_code_url: String,
}

impl<'a> LoginFlow<'a> {
    /// Issue a QR code and open a login session
    pub async fn begin(client: &'a ProxyClient, options: &LoginOptions) -> BridgeResult<Self> {
        let qr = client
            .get_qr_code(&options.device_type, &options.proxy_line)
            .await?;

        info!("Login session {} opened, QR issued", qr.w_id);

        Ok(Self {
            client,
            session: LoginSession {
                w_id: qr.w_id,
                device_type: options.device_type.clone(),
                proxy_line: options.proxy_line.clone(),
            },
            qr_code_url: qr.qr_code_url,
        })
    }

    /// The session handle issued by the proxy
    pub fn session(&self) -> &LoginSession {
        &self.session
    }

    /// URL of the QR code the user must scan
    pub fn qr_code_url(&self) -> &str {
        &self.qr_code_url
    }

    /// Query the current login status once.
    ///
    /// At most one poll per session should be in flight at a time.
    pub async fn poll_once(&self) -> BridgeResult<LoginStatus> {
        let status = self.client.check_login(&self.session.w_id).await?;
        debug!("Session {} status: {:?}", self.session.w_id, status);
        Ok(status)
    }

    /// Poll until the session is logged in.
    ///
    /// Every observed status is handed to `observer` — that is where the
    /// caller surfaces a `NeedVerify` URL to the user while polling
    /// continues. Returns the terminal `LoggedIn` status, or
    /// [`BridgeError::LoginTimeout`] once `max_attempts` polls have passed
    /// without one.
    pub async fn wait_for_login<O>(
        &self,
        interval: Duration,
        max_attempts: u32,
        observer: O,
    ) -> BridgeResult<LoginStatus>
    where
        O: FnMut(&LoginStatus),
    {
        poll_login(|| self.poll_once(), interval, max_attempts, observer).await
    }
}

/// Drive a login poll loop over an arbitrary status source.
///
/// Stops as soon as a `LoggedIn` status is fetched; every status (terminal
/// included) is passed to `observe` in arrival order.
pub async fn poll_login<F, Fut, O>(
    mut fetch: F,
    interval: Duration,
    max_attempts: u32,
    mut observe: O,
) -> BridgeResult<LoginStatus>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BridgeResult<LoginStatus>>,
    O: FnMut(&LoginStatus),
{
    for attempt in 0..max_attempts {
        let status = fetch().await?;
        observe(&status);

        if status.is_logged_in() {
            return Ok(status);
        }

        if attempt + 1 < max_attempts && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    Err(BridgeError::LoginTimeout {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn logged_in() -> LoginStatus {
        LoginStatus::LoggedIn {
            wc_id: "wxid_me".to_string(),
            nick_name: "Alice".to_string(),
            head_url: None,
        }
    }

    fn need_verify() -> LoginStatus {
        LoginStatus::NeedVerify {
            verify_url: "https://example.com/verify".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripted_sequence_observed_in_order() {
        // Exactly four statuses scripted: polling past logged_in would panic
        let script = Mutex::new(VecDeque::from(vec![
            LoginStatus::Waiting,
            LoginStatus::Waiting,
            need_verify(),
            logged_in(),
        ]));
        let mut observed = Vec::new();

        let result = poll_login(
            || {
                let next = script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .expect("polled after logged_in");
                async move { Ok(next) }
            },
            Duration::ZERO,
            10,
            |status| observed.push(status.clone()),
        )
        .await
        .unwrap();

        assert!(result.is_logged_in());
        assert_eq!(
            observed,
            vec![
                LoginStatus::Waiting,
                LoginStatus::Waiting,
                need_verify(),
                logged_in(),
            ]
        );
        assert!(script.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_attempts_is_login_timeout() {
        let mut polls = 0u32;
        let result = poll_login(
            || async { Ok(LoginStatus::Waiting) },
            Duration::ZERO,
            3,
            |_| polls += 1,
        )
        .await;

        assert!(matches!(
            result,
            Err(BridgeError::LoginTimeout { attempts: 3 })
        ));
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let result = poll_login(
            || async {
                Err(BridgeError::proxy(
                    "1100",
                    Some("session expired".to_string()),
                ))
            },
            Duration::ZERO,
            5,
            |_| {},
        )
        .await;

        assert_eq!(result.unwrap_err().to_string(), "session expired");
    }
}
