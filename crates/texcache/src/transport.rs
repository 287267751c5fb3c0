//! # Transport
//!
//! Single-shot network primitives used by the downloader and the texture
//! loader, plus the reqwest-backed implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use rustls::{ClientConfig, crypto::aws_lc_rs};
use rustls_platform_verifier::BuilderVerifierExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::config::LoaderConfig;
use crate::error::{ResourceError, Result, TransportError};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Download `url` into `destination`, returning the response status.
    ///
    /// The body is written whatever the status; callers decide whether the
    /// file is kept.
    async fn download(&self, url: &Url, destination: &Path) -> Result<StatusCode, TransportError>;

    /// Fetch `url` into memory.
    async fn fetch(&self, url: &Url) -> Result<(StatusCode, Bytes), TransportError>;
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &LoaderConfig) -> Result<Client> {
    let provider = Arc::new(aws_lc_rs::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ResourceError::Config(format!("TLS protocol versions: {e}")))?
        .with_platform_verifier()
        .map_err(|e| ResourceError::Config(format!("TLS platform verifier: {e}")))?
        .with_no_client_auth();

    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(4)
        .user_agent(&config.user_agent)
        .default_headers(config.header_map()?)
        .use_preconfigured_tls(tls_config)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if config.use_system_proxy {
        info!("Using system proxy settings for image downloads");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for image downloads");
    }

    client_builder
        .build()
        .map_err(|e| ResourceError::Config(format!("HTTP client: {e}")))
}

/// [`Transport`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &LoaderConfig) -> Result<Self> {
        Ok(Self::new(create_client(config)?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn download(&self, url: &Url, destination: &Path) -> Result<StatusCode, TransportError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        let mut file = fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len();
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(url = %url, status = %status, bytes = written, "Transfer finished");
        Ok(status)
    }

    async fn fetch(&self, url: &Url) -> Result<(StatusCode, Bytes), TransportError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{addr}/miniGame/resource/a.png")).unwrap()
    }

    fn transport() -> HttpTransport {
        let config = LoaderConfig::builder().with_system_proxy(false).build();
        HttpTransport::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn download_writes_body_and_reports_status() {
        let url = serve_once("200 OK", b"png-bytes").await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.png");

        let status = transport().download(&url, &target).await.unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(std::fs::read(&target).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn download_keeps_error_status() {
        let url = serve_once("404 Not Found", b"missing").await;
        let dir = tempfile::tempdir().unwrap();

        let status = transport()
            .download(&url, &dir.path().join("a.png"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fetch_returns_body() {
        let url = serve_once("200 OK", b"hello").await;
        let (status, body) = transport().fetch(&url).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/a.png")).unwrap();
        let err = transport().fetch(&url).await.unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }));
    }
}
