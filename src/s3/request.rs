//! Request descriptor and signed request types

use bytes::Bytes;
use hyper::Method;
use std::collections::BTreeMap;

/// An unsigned S3 request: method, addressing, caller-supplied headers and
/// optional body.
///
/// Header names are kept lower-cased so the map order matches the canonical
/// form SigV4 expects. The key never starts with '/'.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub bucket: String,
    /// Object key, '/'-segmented, stored without a leading slash.
    pub key: String,
    /// Lower-cased header name to value.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl RequestDescriptor {
    pub fn new(method: Method, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let key: String = key.into();
        let key = key.trim_start_matches('/').to_string();
        Self {
            method,
            bucket: bucket.into(),
            key,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn put(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(Method::PUT, bucket, key)
    }

    pub fn head(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(Method::HEAD, bucket, key)
    }

    pub fn get(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(Method::GET, bucket, key)
    }

    /// Add a header. The name is lower-cased on insertion.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully addressed, fully headered request ready to send.
///
/// Produced once per descriptor and not reused: the embedded x-amz-date makes
/// each signature single-use within its validity window.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}
