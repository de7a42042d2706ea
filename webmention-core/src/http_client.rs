use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = concat!("webmention-core/", env!("CARGO_PKG_VERSION"));

/// Build the shared outbound HTTP client: default timeout 10s, a
/// library-identifying User-Agent, and redirect-following enabled (the
/// `reqwest::Client` default). Mirrors the teacher's `build_http_client` in
/// `main.rs`.
pub fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent).unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
}

pub fn default_client() -> reqwest::Result<reqwest::Client> {
    build_client(DEFAULT_USER_AGENT, DEFAULT_HTTP_TIMEOUT)
}
