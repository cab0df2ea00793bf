//! Health probe shared by every strategy.

use crate::channel::WorkChannel;

/// Path of the health endpoint, relative to the sidecar base URL.
pub const HEALTH_PATH: &str = "health";

/// Marker a healthy sidecar includes in its health response.
pub const STATUS_UP_MARKER: &str = r#""status":"UP""#;

/// Whether a health response body reports the service as up.
///
/// Textual match only: whitespace variants such as `"status": "UP"` do not count.
pub fn is_healthy_body(body: &str) -> bool {
    body.contains(STATUS_UP_MARKER)
}

/// Probe the sidecar behind `channel`.
///
/// Transport failures are the normal signal while a sidecar is starting, so
/// they yield `false` rather than an error.
pub async fn probe_health(channel: &dyn WorkChannel) -> bool {
    tracing::debug!("Sending request for health check to: {}", channel.base_url());
    match channel.get(HEALTH_PATH).await {
        Ok(body) => {
            tracing::debug!("ImageInspector health check response: {}", body);
            is_healthy_body(&body)
        }
        Err(e) => {
            tracing::debug!("Health check failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TransportError;
    use crate::testing::StubChannel;

    #[test]
    fn test_healthy_body_requires_exact_marker() {
        assert!(is_healthy_body(r#"{"status":"UP"}"#));
        assert!(is_healthy_body(r#"{"details":{},"status":"UP","x":1}"#));

        assert!(!is_healthy_body(""));
        assert!(!is_healthy_body(r#"{"status":"DOWN"}"#));
        assert!(!is_healthy_body(r#"{"status": "UP"}"#));
        assert!(!is_healthy_body(r#"{"status":"up"}"#));
        assert!(!is_healthy_body(r#"{"status":"UP"#));
        assert!(!is_healthy_body("<html>UP</html>"));
    }

    #[tokio::test]
    async fn test_probe_maps_transport_failure_to_false() {
        let channel = StubChannel::new("http://localhost:8082");
        channel.push_health(Err(TransportError::new(None, "connection refused")));
        channel.push_health(Ok(r#"{"status":"UP"}"#.to_string()));

        assert!(!probe_health(&channel).await);
        assert!(probe_health(&channel).await);
        assert_eq!(channel.health_probes(), 2);
    }

    #[test]
    fn test_probe_counts_once_per_call() {
        let channel = StubChannel::healthy("http://localhost:8080");
        assert!(tokio_test::block_on(probe_health(&channel)));
        assert_eq!(channel.health_probes(), 1);
    }
}
