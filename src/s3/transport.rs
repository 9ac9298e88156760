//! Signed S3 transport: PUT, HEAD, GET over hyper
//!
//! Each operation signs its descriptor and issues the HTTP call. Non-2xx
//! responses are normalized into `TransportError::Status` with the status
//! code; interpreting 404 as "not ready" during polling is the workflow's
//! responsibility, not the transport's.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::{Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Credentials;
use crate::s3::request::RequestDescriptor;
use crate::s3::sign::RequestSigner;

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("request failed: {0}")]
    Connection(String),

    #[error("storage returned {status}: {message}")]
    Status { status: StatusCode, message: String },
}

impl TransportError {
    /// HTTP status code, when the failure carried one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 404 on a probe means the derived object is not ready yet.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// HEAD result: the poller only needs the declared metadata.
#[derive(Debug, Clone, Default)]
pub struct HeadResponse {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// GET result: full body plus declared content type.
#[derive(Debug, Clone)]
pub struct GetResponse {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// The three object operations the workflow engine drives.
///
/// `S3Transport` implements this over HTTPS; tests substitute scripted
/// stores to exercise the polling state machine without a network.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, descriptor: &RequestDescriptor) -> Result<()>;
    async fn head(&self, descriptor: &RequestDescriptor) -> Result<HeadResponse>;
    async fn get(&self, descriptor: &RequestDescriptor) -> Result<GetResponse>;
}

/// HTTPS transport for virtual-hosted-style S3 requests
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct S3Transport {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    signer: RequestSigner,
}

impl S3Transport {
    /// Create a transport bound to one set of credentials.
    ///
    /// HTTP/1.1 only, TCP_NODELAY, 10s connect timeout, native-tls for TLS.
    pub fn new(credentials: Credentials) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = TlsConnector::new().expect("Failed to build TLS connector");
        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(https);

        Self {
            client,
            signer: RequestSigner::new(credentials),
        }
    }

    /// Sign and send one request, collecting the full response body.
    async fn send(&self, descriptor: &RequestDescriptor) -> Result<(HeaderMap, Bytes)> {
        let signed = self.signer.sign(descriptor);

        let mut req = Request::builder()
            .method(descriptor.method.clone())
            .uri(&signed.url);
        for (name, value) in &signed.headers {
            req = req.header(name, value);
        }
        let body = signed.body.unwrap_or_else(Bytes::new);
        let request = req.body(Full::new(body))?;

        debug!(method = %descriptor.method, url = %signed.url, "sending signed request");

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.collect().await?.to_bytes();

        if !status.is_success() {
            let message = String::from_utf8_lossy(&body).to_string();
            return Err(TransportError::Status { status, message });
        }
        Ok((headers, body))
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl ObjectStore for S3Transport {
    async fn put(&self, descriptor: &RequestDescriptor) -> Result<()> {
        self.send(descriptor).await.map(|_| ())
    }

    async fn head(&self, descriptor: &RequestDescriptor) -> Result<HeadResponse> {
        let (headers, _) = self.send(descriptor).await?;
        Ok(HeadResponse {
            content_type: header_str(&headers, "content-type"),
            content_length: header_str(&headers, "content-length").and_then(|v| v.parse().ok()),
        })
    }

    async fn get(&self, descriptor: &RequestDescriptor) -> Result<GetResponse> {
        let (headers, body) = self.send(descriptor).await?;
        Ok(GetResponse {
            body,
            content_type: header_str(&headers, "content-type"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let not_found = TransportError::Status {
            status: StatusCode::NOT_FOUND,
            message: String::new(),
        };
        assert!(not_found.is_not_found());

        let forbidden = TransportError::Status {
            status: StatusCode::FORBIDDEN,
            message: String::new(),
        };
        assert!(!forbidden.is_not_found());
        assert_eq!(forbidden.status(), Some(StatusCode::FORBIDDEN));

        let connection = TransportError::Connection("refused".to_string());
        assert!(!connection.is_not_found());
        assert_eq!(connection.status(), None);
    }

    #[test]
    fn test_header_str() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "image/png".parse().unwrap());
        assert_eq!(header_str(&headers, "content-type"), Some("image/png".to_string()));
        assert_eq!(header_str(&headers, "content-length"), None);
    }
}
