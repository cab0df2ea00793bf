//! reqwest-backed [`WorkChannel`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::channel::{
    ChannelConnector, ConnectError, RedirectSignal, TransportError, WorkChannel, WorkOutcome,
};
use crate::platform::PlatformVariant;

/// Path of the work endpoint on an inspector sidecar.
const WORK_PATH: &str = "getbdio";

/// Longest slice of an error body carried into a [`TransportError`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Creates [`HttpWorkChannel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl ChannelConnector for HttpConnector {
    fn connect(
        &self,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn WorkChannel>, ConnectError> {
        tracing::debug!(
            "Creating a rest connection ({} second timeout) for URL: {}",
            timeout.as_secs(),
            base_url
        );
        let channel = HttpWorkChannel::new(base_url, timeout)?;
        Ok(Arc::new(channel))
    }
}

/// Non-redirecting HTTP connection to one sidecar.
pub struct HttpWorkChannel {
    client: Client,
    base: Url,
    base_url: String,
}

impl HttpWorkChannel {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectError> {
        let mut base = Url::parse(base_url).map_err(|e| ConnectError::MalformedUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(ConnectError::MalformedUrl {
                url: base_url.to_string(),
                reason: "expected an http(s) URL with a host".to_string(),
            });
        }
        // Keep the base path when joining relative request paths.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConnectError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::new(None, format!("invalid path '{path}': {e}")))
    }
}

#[async_trait]
impl WorkChannel for HttpWorkChannel {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str) -> Result<String, TransportError> {
        let url = self.url_for(path)?;
        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        response.text().await.map_err(request_error)
    }

    async fn submit_work(
        &self,
        container_path: &str,
        filename: &str,
        cleanup: bool,
    ) -> Result<WorkOutcome, TransportError> {
        let mut url = self.url_for(WORK_PATH)?;
        url.query_pairs_mut()
            .append_pair("tarfile", container_path)
            .append_pair("resultingcontainerfspath", filename)
            .append_pair("cleanup", if cleanup { "true" } else { "false" });

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();

        if status.is_success() {
            let payload = response.text().await.map_err(request_error)?;
            return Ok(WorkOutcome::Completed(payload));
        }

        if status.is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();
            return Ok(WorkOutcome::Redirected(RedirectSignal {
                status: status.as_u16(),
                target: PlatformVariant::find_in(&body),
                location,
                body,
            }));
        }

        Err(status_error(status, response).await)
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    TransportError::new(e.status().map(|s| s.as_u16()), e.to_string())
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> TransportError {
    let reason = status.canonical_reason().unwrap_or("unknown status");
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    let message = if body.is_empty() {
        reason.to_string()
    } else {
        let excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{reason}: {excerpt}")
    };
    TransportError::new(Some(status.as_u16()), message)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn http_response(status_line: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    fn channel(base: &str) -> HttpWorkChannel {
        HttpWorkChannel::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_rejects_malformed_urls() {
        for bad in ["not a url", "ftp://localhost:8080", "http://"] {
            let result = HttpWorkChannel::new(bad, Duration::from_secs(1));
            assert!(
                matches!(result, Err(ConnectError::MalformedUrl { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let channel = channel("http://localhost:8082/");
        assert_eq!(channel.base_url(), "http://localhost:8082");
        assert_eq!(
            channel.url_for("health").unwrap().as_str(),
            "http://localhost:8082/health"
        );
    }

    #[tokio::test]
    async fn test_get_returns_body() {
        let (base, server) =
            serve_once(http_response("200 OK", "", r#"{"status":"UP"}"#)).await;

        let body = channel(&base).get("health").await.unwrap();

        assert_eq!(body, r#"{"status":"UP"}"#);
        assert!(server.await.unwrap().starts_with("GET /health HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_get_non_success_is_transport_error() {
        let (base, _server) = serve_once(http_response("503 Service Unavailable", "", "")).await;

        let err = channel(&base).get("health").await.unwrap_err();

        assert_eq!(err.status, Some(503));
        assert_eq!(err.message, "Service Unavailable");
    }

    #[tokio::test]
    async fn test_get_connection_refused_has_no_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = channel(&format!("http://{addr}"))
            .get("health")
            .await
            .unwrap_err();

        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn test_submit_completed() {
        let (base, server) = serve_once(http_response("200 OK", "", "P")).await;

        let outcome = channel(&base)
            .submit_work("/opt/work/image.tar", "image_containerfs.tar.gz", true)
            .await
            .unwrap();

        assert_eq!(outcome, WorkOutcome::Completed("P".to_string()));
        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /getbdio?"));
        assert!(request_line.contains("tarfile=%2Fopt%2Fwork%2Fimage.tar"));
        assert!(request_line.contains("resultingcontainerfspath=image_containerfs.tar.gz"));
        assert!(request_line.contains("cleanup=true"));
    }

    #[tokio::test]
    async fn test_submit_redirect_is_not_followed() {
        let (base, _server) = serve_once(http_response(
            "302 Found",
            "Location: http://localhost:8080/getbdio\r\n",
            "ALPINE",
        ))
        .await;

        let outcome = channel(&base)
            .submit_work("/opt/work/image.tar", "fs.tar.gz", false)
            .await
            .unwrap();

        match outcome {
            WorkOutcome::Redirected(signal) => {
                assert_eq!(signal.status, 302);
                assert_eq!(signal.target, Some(PlatformVariant::Alpine));
                assert_eq!(
                    signal.location.as_deref(),
                    Some("http://localhost:8080/getbdio")
                );
                assert_eq!(signal.body, "ALPINE");
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_server_error_carries_status_and_body() {
        let (base, _server) = serve_once(http_response(
            "500 Internal Server Error",
            "",
            "tarfile not found",
        ))
        .await;

        let err = channel(&base)
            .submit_work("/opt/work/image.tar", "fs.tar.gz", false)
            .await
            .unwrap_err();

        assert_eq!(err.status, Some(500));
        assert_eq!(err.message, "Internal Server Error: tarfile not found");
    }
}
