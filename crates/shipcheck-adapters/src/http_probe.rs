//! HTTP probe backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use shipcheck_core::{HttpProbe, HttpResponse, QueryError, QueryResult};

use crate::error::Result;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Issues a GET per probe attempt.
///
/// The client is stateless between requests (no cookie store) and is safe to
/// share across concurrent verification runs.
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("shipcheck/{}", shipcheck_core::VERSION))
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

/// Turn an address into a URL. A bare host or IP gets `http://`.
pub fn endpoint_url(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn request(&self, address: &str) -> QueryResult<HttpResponse> {
        let url = endpoint_url(address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_endpoint_url_adds_scheme() {
        assert_eq!(endpoint_url("203.0.113.10"), "http://203.0.113.10");
        assert_eq!(endpoint_url(" example.com:8080/health "), "http://example.com:8080/health");
    }

    #[test]
    fn test_endpoint_url_keeps_scheme() {
        assert_eq!(endpoint_url("https://example.com"), "https://example.com");
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            socket.shutdown().await.ok();
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn test_request_returns_status_and_body() {
        let addr = serve_once("200 OK", "Your deployment is working.").await;
        let probe = ReqwestProbe::new(Duration::from_secs(5)).expect("probe");

        let response = probe.request(&addr).await.expect("request");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "Your deployment is working.");
    }

    #[tokio::test]
    async fn test_non_success_status_is_not_an_error() {
        let addr = serve_once("503 Service Unavailable", "warming up").await;
        let probe = ReqwestProbe::new(Duration::from_secs(5)).expect("probe");

        let response = probe.request(&addr).await.expect("request");
        assert_eq!(response.status, 503);
        assert_eq!(response.body, "warming up");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        drop(listener);

        let probe = ReqwestProbe::new(Duration::from_secs(5)).expect("probe");
        let err = probe.request(&addr).await.unwrap_err();
        assert!(matches!(err, QueryError::Transport(_)));
    }
}
