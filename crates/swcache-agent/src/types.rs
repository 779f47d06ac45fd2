//! Cache keys, versions and stored response snapshots.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use swcache_net::{Request, Response, ResponseType};
use url::Url;

use crate::{AgentError, Result};

/// Tag naming one generation of cached content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVersion(String);

impl CacheVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheVersion {
    fn from(version: &str) -> Self {
        Self::new(version)
    }
}

/// Lookup key for a cached request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::GET.to_string(),
            url: url.into(),
        }
    }

    /// Key for a request. Only GET requests are cacheable.
    pub fn from_request(request: &Request) -> Option<Self> {
        (request.method == Method::GET).then(|| Self::get(&request.url))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Immutable snapshot of a response at the time it was stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    url: String,
    status: u16,
    headers: Vec<StoredHeader>,
    #[serde(with = "base64_bytes")]
    body: Bytes,
    response_type: StoredType,
    /// Stored at timestamp (ms since epoch).
    stored_at: u64,
}

// Values are raw bytes; header values need not be UTF-8.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredHeader {
    name: String,
    #[serde(with = "base64_bytes")]
    value: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoredType {
    Basic,
    Cors,
    Opaque,
}

impl StoredResponse {
    /// Take a snapshot of `response`.
    pub fn snapshot(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| StoredHeader {
                name: name.as_str().to_string(),
                value: Bytes::copy_from_slice(value.as_bytes()),
            })
            .collect();

        let response_type = match response.response_type {
            ResponseType::Basic | ResponseType::Error => StoredType::Basic,
            ResponseType::Cors => StoredType::Cors,
            ResponseType::Opaque => StoredType::Opaque,
        };

        Self {
            url: response.url.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.clone(),
            response_type,
            stored_at: now_millis(),
        }
    }

    /// Rebuild a response from this snapshot.
    pub fn to_response(&self) -> Result<Response> {
        let url = Url::parse(&self.url)?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| AgentError::Storage(format!("corrupt status for {}: {e}", self.url)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for header in &self.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| AgentError::Storage(format!("corrupt header for {}: {e}", self.url)))?;
            let value = HeaderValue::from_bytes(&header.value)
                .map_err(|e| AgentError::Storage(format!("corrupt header for {}: {e}", self.url)))?;
            headers.append(name, value);
        }

        let response_type = match self.response_type {
            StoredType::Basic => ResponseType::Basic,
            StoredType::Cors => ResponseType::Cors,
            StoredType::Opaque => ResponseType::Opaque,
        };

        Ok(Response {
            url,
            status,
            headers,
            body: self.body.clone(),
            response_type,
            redirected: false,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn stored_at(&self) -> u64 {
        self.stored_at
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
