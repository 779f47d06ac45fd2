//! Offline fallback document.

use http::{header, HeaderValue, StatusCode};
use swcache_net::Response;
use url::Url;

/// Self-contained page shown when a navigation fails with no cached copy.
/// Must not reference any external resource.
pub const OFFLINE_DOCUMENT: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Offline</title>
  <style>
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
      background: #1a1a1a;
      color: #ffffff;
      display: flex;
      align-items: center;
      justify-content: center;
      min-height: 100vh;
      margin: 0;
      text-align: center;
      padding: 20px;
    }
    .container {
      background: #2a2a2a;
      border-radius: 16px;
      padding: 48px;
      max-width: 400px;
    }
    .title { font-size: 24px; margin-bottom: 16px; }
    .message { color: #888; line-height: 1.5; margin-bottom: 24px; }
    .retry-btn {
      background: #ffffff;
      color: #1a1a1a;
      border: none;
      padding: 16px 24px;
      border-radius: 12px;
      cursor: pointer;
      font-size: 16px;
    }
  </style>
</head>
<body>
  <div class="container">
    <h1 class="title">You are offline</h1>
    <p class="message">
      The app keeps working with the data it has cached. Reconnect to load this page.
    </p>
    <button class="retry-btn" onclick="window.location.reload()">Try again</button>
  </div>
</body>
</html>
"#;

/// Build the offline response for a failed navigation to `url`.
pub fn offline_response(url: &Url) -> Response {
    Response::new(url.clone(), StatusCode::OK)
        .with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )
        .with_body(OFFLINE_DOCUMENT)
}
