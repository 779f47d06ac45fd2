//! Request classification.

use hashbrown::HashSet;
use http::Method;
use swcache_net::Request;
use tracing::trace;
use url::{Origin, Url};

/// How the agent treats an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClassification {
    /// Same origin as the agent; handled.
    SameOrigin,
    /// Cross-origin request to a trusted host; handled.
    AllowedCrossOrigin,
    /// Left to default browser handling.
    Ignored,
}

impl RequestClassification {
    /// Whether the request goes to the resolution strategy.
    pub fn is_eligible(self) -> bool {
        !matches!(self, RequestClassification::Ignored)
    }
}

/// Set of trusted cross-origin hosts.
///
/// Matching is on the exact host name, so `unpkg.com.attacker.net` does not
/// match `unpkg.com`.
#[derive(Debug, Clone, Default)]
pub struct TrustedHosts {
    hosts: HashSet<String>,
}

impl TrustedHosts {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Whether `url` points at a trusted host.
    pub fn contains(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| self.hosts.contains(host.trim_end_matches('.')))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Decides which requests the agent handles.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    origin: Origin,
    trusted: TrustedHosts,
}

impl RequestRouter {
    /// Create a router for the agent at `scope`.
    pub fn new(scope: &Url, trusted: TrustedHosts) -> Self {
        Self {
            origin: scope.origin(),
            trusted,
        }
    }

    /// Classify a request. Rules apply in order: non-GET is ignored,
    /// same-origin is handled, trusted hosts are handled, everything else is
    /// ignored.
    pub fn classify(&self, request: &Request) -> RequestClassification {
        let classification = if request.method != Method::GET {
            RequestClassification::Ignored
        } else if request.url.origin() == self.origin {
            RequestClassification::SameOrigin
        } else if self.trusted.contains(&request.url) {
            RequestClassification::AllowedCrossOrigin
        } else {
            RequestClassification::Ignored
        };

        trace!(url = %request.url, method = %request.method, ?classification, "Classified request");
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn router() -> RequestRouter {
        let scope = Url::parse("https://app.example/boikot/").unwrap();
        RequestRouter::new(&scope, TrustedHosts::new(["unpkg.com"]))
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_same_origin() {
        let router = router();
        assert_eq!(
            router.classify(&get("https://app.example/boikot/index.html")),
            RequestClassification::SameOrigin
        );
        // Outside the scope path but same origin.
        assert_eq!(
            router.classify(&get("https://app.example/other")),
            RequestClassification::SameOrigin
        );
    }

    #[test]
    fn test_trusted_host() {
        let router = router();
        assert_eq!(
            router.classify(&get("https://unpkg.com/vue@3/dist/vue.global.js")),
            RequestClassification::AllowedCrossOrigin
        );
    }

    #[test]
    fn test_lookalike_hosts_are_ignored() {
        let router = router();
        for url in [
            "https://unpkg.com.attacker.net/vue.js",
            "https://evil-unpkg.com/vue.js",
            "https://attacker.net/unpkg.com/vue.js",
            "https://cdn.unpkg.com/vue.js",
        ] {
            assert_eq!(
                router.classify(&get(url)),
                RequestClassification::Ignored,
                "{url}"
            );
        }
    }

    #[test]
    fn test_other_origins_ignored() {
        let router = router();
        assert_eq!(
            router.classify(&get("https://fonts.example/font.woff2")),
            RequestClassification::Ignored
        );
        // Scheme and port are part of the origin.
        assert_eq!(
            router.classify(&get("http://app.example/boikot/")),
            RequestClassification::Ignored
        );
        assert_eq!(
            router.classify(&get("https://app.example:8443/")),
            RequestClassification::Ignored
        );
    }

    #[test]
    fn test_non_get_ignored() {
        let router = router();
        let url = Url::parse("https://app.example/api").unwrap();

        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            let mut request = Request::post(url.clone(), Bytes::new());
            request.method = method.clone();
            assert_eq!(
                router.classify(&request),
                RequestClassification::Ignored,
                "{method}"
            );
        }
    }

    #[test]
    fn test_trusted_hosts_normalized() {
        let hosts = TrustedHosts::new([" UNPKG.com. ", ""]);
        assert_eq!(hosts.len(), 1);
        assert!(hosts.contains(&Url::parse("https://unpkg.com/x").unwrap()));
        assert!(!TrustedHosts::default().contains(&Url::parse("https://unpkg.com/").unwrap()));
    }
}
