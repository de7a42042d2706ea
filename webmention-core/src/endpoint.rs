use std::time::Duration;

use reqwest::header::LINK;
use scraper::{Html, Selector};
use url::Url;

use crate::error::{Error, Result};
use crate::http_client::{self, DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT};

/// Discovers a target URL's Webmention endpoint (spec §4.2): an HTTP `Link`
/// header takes priority over an in-document `<link>`/`<a>` with
/// `rel="webmention"`, and relative endpoints are resolved against the final
/// (post-redirect) URL of the target fetch.
#[derive(Clone)]
pub struct EndpointDiscoverer {
    client: reqwest::Client,
    timeout: Duration,
}

impl EndpointDiscoverer {
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT.to_string())
    }

    pub fn with_config(timeout: Duration, user_agent: String) -> Result<Self> {
        let client = http_client::build_client(&user_agent, timeout)?;
        Ok(Self { client, timeout })
    }

    /// Discover the Webmention endpoint for `target_url`, issuing a fresh GET
    /// (discovery always fetches its own copy; it never reuses a prior
    /// response body, per spec §4.2).
    pub async fn discover(&self, target_url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(target_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let final_url = response.url().clone();

        if let Some(link_header_endpoint) = Self::from_link_headers(&response, &final_url) {
            return Ok(Some(link_header_endpoint));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::upstream(e.to_string()))?;

        Ok(Self::from_html(&body, &final_url))
    }

    fn from_link_headers(response: &reqwest::Response, base: &Url) -> Option<String> {
        for value in response.headers().get_all(LINK).iter() {
            let raw = value.to_str().ok()?;
            for link in raw.split(',') {
                if let Some(endpoint) = parse_link_header_entry(link, base) {
                    return Some(endpoint);
                }
            }
        }
        None
    }

    fn from_html(body: &str, base: &Url) -> Option<String> {
        let document = Html::parse_document(body);

        let link_selector = Selector::parse(r#"link[rel~="webmention"][href]"#).ok()?;
        if let Some(el) = document.select(&link_selector).next() {
            if let Some(href) = el.value().attr("href") {
                return resolve(base, href);
            }
        }

        let anchor_selector = Selector::parse(r#"a[rel~="webmention"][href]"#).ok()?;
        if let Some(el) = document.select(&anchor_selector).next() {
            if let Some(href) = el.value().attr("href") {
                return resolve(base, href);
            }
        }

        None
    }
}

/// Parse one comma-separated entry of an HTTP `Link` header, e.g.
/// `<https://example.com/webmention>; rel="webmention"`.
fn parse_link_header_entry(entry: &str, base: &Url) -> Option<String> {
    let entry = entry.trim();
    let url_part = entry.split(';').next()?.trim();
    let url_part = url_part.strip_prefix('<')?.strip_suffix('>')?;

    let has_webmention_rel = entry
        .split(';')
        .skip(1)
        .any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"'))
                .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("webmention")))
                .unwrap_or(false)
        });

    if !has_webmention_rel {
        return None;
    }

    resolve(base, url_part)
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn prefers_link_header_over_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/target"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Link", "<https://endpoint.example/webmention>; rel=\"webmention\"")
                    .set_body_string(
                        r#"<html><head><link rel="webmention" href="/other"></head></html>"#,
                    ),
            )
            .mount(&server)
            .await;

        let discoverer = EndpointDiscoverer::new().unwrap();
        let url = format!("{}/target", server.uri());
        let endpoint = discoverer.discover(&url).await.unwrap();
        assert_eq!(
            endpoint.as_deref(),
            Some("https://endpoint.example/webmention")
        );
    }

    #[tokio::test]
    async fn falls_back_to_html_link_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/target"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><link rel="webmention" href="/wm"></head></html>"#,
            ))
            .mount(&server)
            .await;

        let discoverer = EndpointDiscoverer::new().unwrap();
        let url = format!("{}/target", server.uri());
        let endpoint = discoverer.discover(&url).await.unwrap();
        assert_eq!(endpoint, Some(format!("{}/wm", server.uri())));
    }

    #[tokio::test]
    async fn falls_back_to_anchor_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/target"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><a href="/wm-anchor" rel="webmention">send</a></body></html>"#,
            ))
            .mount(&server)
            .await;

        let discoverer = EndpointDiscoverer::new().unwrap();
        let url = format!("{}/target", server.uri());
        let endpoint = discoverer.discover(&url).await.unwrap();
        assert_eq!(endpoint, Some(format!("{}/wm-anchor", server.uri())));
    }

    #[tokio::test]
    async fn none_when_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/target"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let discoverer = EndpointDiscoverer::new().unwrap();
        let url = format!("{}/target", server.uri());
        assert_eq!(discoverer.discover(&url).await.unwrap(), None);
    }
}
