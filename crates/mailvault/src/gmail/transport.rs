//! HTTP transport for the Gmail API
//!
//! The client only needs authenticated GETs. Keeping them behind a trait
//! lets tests substitute an in-memory mailbox.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;

/// Largest response body accepted (raw messages are base64url-encoded)
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Largest error body read for classification
const MAX_ERROR_BODY_BYTES: u64 = 64 * 1024;

/// Authenticated GET returning the response body
///
/// Implementations classify failures: non-2xx statuses via
/// [`ApiError::from_response`], connection problems as [`ApiError::Transport`].
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, bearer: &str) -> Result<String, ApiError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn get(&self, url: &str, bearer: &str) -> Result<String, ApiError> {
        (**self).get(url, bearer)
    }
}

/// Blocking transport backed by a ureq agent
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self::with_proxy(timeout, ureq::Proxy::try_from_env())
    }

    fn with_proxy(timeout: Duration, proxy: Option<ureq::Proxy>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .proxy(proxy)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, bearer: &str) -> Result<String, ApiError> {
        let response = self
            .agent
            .get(url)
            .header("Authorization", &format!("Bearer {}", bearer))
            .call();

        let mut resp = match response {
            Ok(resp) => resp,
            Err(ureq::Error::StatusCode(status)) => return Err(ApiError::from_status(status, url)),
            Err(e) => return Err(ApiError::Transport(e.to_string())),
        };

        let status = resp.status();
        if !status.is_success() {
            // An unreadable error body still classifies by status
            let body = resp
                .body_mut()
                .with_config()
                .limit(MAX_ERROR_BODY_BYTES)
                .read_to_string()
                .unwrap_or_default();
            return Err(ApiError::from_response(status.as_u16(), url, &body));
        }

        resp.body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_string()
            .map_err(|e| ApiError::Transport(format!("failed to read response body: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response on a local port and return its URL
    fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{}/gmail/v1/users/me/messages/m1", addr)
    }

    fn local_transport() -> UreqTransport {
        UreqTransport::with_proxy(Duration::from_secs(5), None)
    }

    #[test]
    fn test_quota_403_is_retryable() {
        let url = serve_once(
            "403 Forbidden",
            r#"{"error":{"code":403,"message":"Rate Limit Exceeded","errors":[{"domain":"usageLimits","reason":"rateLimitExceeded"}]}}"#,
        );
        let err = local_transport().get(&url, "token").unwrap_err();
        assert_eq!(err, ApiError::RateLimited { status: 403 });
        assert!(err.is_transient());
    }

    #[test]
    fn test_permission_403_is_auth() {
        let url = serve_once(
            "403 Forbidden",
            r#"{"error":{"code":403,"errors":[{"reason":"insufficientPermissions"}]}}"#,
        );
        let err = local_transport().get(&url, "token").unwrap_err();
        assert_eq!(err, ApiError::Auth { status: 403 });
    }

    #[test]
    fn test_success_body_is_returned() {
        let url = serve_once("200 OK", r#"{"id":"m1"}"#);
        let body = local_transport().get(&url, "token").unwrap();
        assert_eq!(body, r#"{"id":"m1"}"#);
    }
}
