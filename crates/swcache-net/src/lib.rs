//! # swcache Net
//!
//! Request and response model plus the network fetcher used by the offline
//! caching agent.
//!
//! ## Design Goals
//!
//! 1. **Buffered responses**: bodies are fully read so a response can be
//!    cloned into the cache and returned to the caller at the same time
//! 2. **Fetcher seam**: the agent only sees the [`Fetcher`] trait, so tests can
//!    script the network without a server
//! 3. **Response tainting**: every response is tagged basic, cors, or opaque
//!    relative to the agent's own origin

use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use thiserror::Error;
use url::Url;

pub mod loader;

pub use loader::{Fetcher, HttpFetcher, LoaderConfig};

/// Why a fetch produced no response.
#[derive(Error, Debug)]
pub enum NetError {
    /// Connection, DNS, or body read failure.
    #[error("Fetch failed: {0}")]
    RequestFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// What the requested resource will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Top-level or nested document.
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    /// `fetch()`/XHR from script.
    #[default]
    Empty,
}

/// Request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Page navigation.
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// An outgoing request as the agent sees it.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub destination: Destination,
    pub mode: RequestMode,
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a request with an arbitrary method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
            destination: Destination::Empty,
            mode: RequestMode::Cors,
            timeout: None,
        }
    }

    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(body);
        request
    }

    /// Create a top-level document navigation.
    pub fn navigate(url: Url) -> Self {
        Self::get(url)
            .destination(Destination::Document)
            .mode(RequestMode::Navigate)
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the destination.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Set the mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Per-request timeout, overriding the loader default.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Whether this request loads a document.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination == Destination::Document
    }
}

/// Response tainting relative to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Same-origin response.
    #[default]
    Basic,
    /// Cross-origin response readable under CORS.
    Cors,
    /// Cross-origin response with hidden status, headers and body.
    Opaque,
    /// Synthesized network error.
    Error,
}

/// HTTP response with a fully buffered body.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
    pub redirected: bool,
}

impl Response {
    /// Create an empty basic response.
    pub fn new(url: Url, status: StatusCode) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Basic,
            redirected: false,
        }
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the response type.
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Parsed `Content-Type`, if any.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_request() {
        let url = Url::parse("https://app.example/products.json").unwrap();
        let request = Request::get(url.clone())
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .timeout(Duration::from_secs(5));

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.destination, Destination::Empty);
        assert_eq!(request.headers[header::ACCEPT], "application/json");
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
        assert!(!request.is_navigation());
    }

    #[test]
    fn test_post_carries_body() {
        let url = Url::parse("https://app.example/cart").unwrap();
        let request = Request::post(url, Bytes::from_static(b"{\"id\":3}"));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body.as_deref(), Some(&b"{\"id\":3}"[..]));
    }

    #[test]
    fn test_navigation_request() {
        let url = Url::parse("https://app.example/checkout").unwrap();
        assert!(Request::navigate(url.clone()).is_navigation());
        assert!(Request::get(url.clone())
            .destination(Destination::Document)
            .is_navigation());
        assert!(Request::get(url).mode(RequestMode::Navigate).is_navigation());
    }

    #[test]
    fn test_response_content_type() {
        let url = Url::parse("https://app.example/products.json").unwrap();
        let response = Response::new(url, StatusCode::OK)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            )
            .with_body("[]");

        assert!(response.ok());
        assert_eq!(response.content_type().unwrap().essence_str(), "application/json");
        assert_eq!(response.text().unwrap(), "[]");
    }

    #[test]
    fn test_response_not_ok() {
        let url = Url::parse("https://app.example/missing.png").unwrap();
        let response = Response::new(url, StatusCode::NOT_FOUND);
        assert!(!response.ok());
        assert!(response.content_type().is_none());
    }
}
