use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::endpoint::EndpointDiscoverer;
use crate::error::{Error, Result};
use crate::incoming::MentionCallbacks;
use crate::model::{ContentTextFormat, Direction, Mention, MentionStatus};
use crate::storage::Storage;

const CONCURRENT_DISPATCH_LIMIT: usize = 10;

static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]\((https?://[^\s)]+)\)").unwrap());
static BARE_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s<>\)\]]+").unwrap());

/// Processes outbound link changes for a locally-authored resource (spec
/// §4.4): diffs the links currently present against what was last recorded,
/// then dispatches one background task per added/removed target.
pub struct OutgoingProcessor {
    client: reqwest::Client,
    discoverer: EndpointDiscoverer,
    storage: Arc<dyn Storage>,
    callbacks: Arc<dyn MentionCallbacks>,
    semaphore: Arc<Semaphore>,
    http_timeout: Duration,
}

impl OutgoingProcessor {
    pub fn new(
        client: reqwest::Client,
        discoverer: EndpointDiscoverer,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            client,
            discoverer,
            storage,
            callbacks: Arc::new(crate::incoming::NoopCallbacks),
            semaphore: Arc::new(Semaphore::new(CONCURRENT_DISPATCH_LIMIT)),
            http_timeout: crate::http_client::DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn MentionCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Diff the outbound links of `source_url` against what storage has
    /// recorded and dispatch background notification tasks for every
    /// addition/removal. Returns the dispatched (not yet necessarily
    /// complete) task handles.
    pub async fn process(
        &self,
        source_url: &str,
        text: Option<String>,
        text_format: Option<ContentTextFormat>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let (body, format) = match text {
            Some(text) => (text, text_format.unwrap_or(ContentTextFormat::Html)),
            None => {
                let response = self
                    .client
                    .get(source_url)
                    .timeout(self.http_timeout)
                    .send()
                    .await
                    .map_err(|e| Error::upstream(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(Error::upstream(format!(
                        "source fetch failed: {}",
                        response.status()
                    )));
                }
                let body = response
                    .text()
                    .await
                    .map_err(|e| Error::upstream(e.to_string()))?;
                (body, text_format.unwrap_or(ContentTextFormat::Html))
            }
        };

        let now_links = extract_links(&body, format);

        let previous = self
            .storage
            .retrieve_webmentions(source_url, Direction::Out)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, source_url, "failed to load previous outgoing mentions, treating as empty");
                Vec::new()
            });
        let previous_targets: HashSet<String> = previous.into_iter().map(|m| m.target).collect();

        let now_set: HashSet<&String> = now_links.iter().collect();
        let added: Vec<String> = now_links
            .iter()
            .filter(|url| !previous_targets.contains(*url))
            .cloned()
            .collect();
        let removed: Vec<String> = previous_targets
            .iter()
            .filter(|url| !now_set.contains(*url))
            .cloned()
            .collect();

        let mut handles = Vec::with_capacity(added.len() + removed.len());

        for target in added {
            handles.push(self.spawn_dispatch(source_url.to_string(), target, false));
        }
        for target in removed {
            handles.push(self.spawn_dispatch(source_url.to_string(), target, true));
        }

        Ok(handles)
    }

    fn spawn_dispatch(&self, source: String, target: String, is_removal: bool) -> JoinHandle<()> {
        let client = self.client.clone();
        let discoverer = self.discoverer.clone();
        let storage = self.storage.clone();
        let callbacks = self.callbacks.clone();
        let semaphore = self.semaphore.clone();
        let timeout = self.http_timeout;

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };

            let endpoint = match discoverer.discover(&target).await {
                Ok(Some(endpoint)) => endpoint,
                Ok(None) => {
                    if !is_removal {
                        return;
                    }
                    // Removal still deletes local state even with no endpoint
                    // to notify (spec §4.4: "may be null").
                    if let Err(err) = storage.delete_webmention(&source, &target, Direction::Out).await {
                        error!(error = %err, source, target, "failed to delete outgoing mention");
                    }
                    return;
                }
                Err(err) => {
                    warn!(error = %err, source, target, "endpoint discovery failed");
                    if !is_removal {
                        return;
                    }
                    if let Err(err) = storage.delete_webmention(&source, &target, Direction::Out).await {
                        error!(error = %err, source, target, "failed to delete outgoing mention");
                    }
                    return;
                }
            };

            let post_result = client
                .post(&endpoint)
                .timeout(timeout)
                .form(&[("source", source.as_str()), ("target", target.as_str())])
                .send()
                .await;

            match post_result {
                Ok(response) if response.status().is_success() => {
                    info!(source, target, endpoint, "webmention notification delivered");
                }
                Ok(response) => {
                    warn!(source, target, status = %response.status(), "webmention endpoint returned non-success");
                }
                Err(err) => {
                    warn!(error = %err, source, target, "failed to deliver webmention notification");
                }
            }

            if is_removal {
                if let Err(err) = storage.delete_webmention(&source, &target, Direction::Out).await {
                    error!(error = %err, source, target, "failed to delete outgoing mention");
                    return;
                }
                let tombstone = Mention::new(source.clone(), target.clone(), Direction::Out);
                if let Err(err) = callbacks.on_mention_deleted(&tombstone).await {
                    error!(error = %err, source, target, "on_mention_deleted callback failed");
                }
            } else if post_result_was_success(&post_result) {
                let mut mention = Mention::new(source.clone(), target.clone(), Direction::Out);
                mention.status = MentionStatus::Confirmed;
                match storage.store_webmention(mention).await {
                    Ok(stored) => {
                        if let Err(err) = callbacks.on_mention_processed(&stored).await {
                            error!(error = %err, source, target, "on_mention_processed callback failed");
                        }
                    }
                    Err(err) => error!(error = %err, source, target, "failed to store outgoing mention"),
                }
            }
        })
    }
}

fn post_result_was_success(result: &reqwest::Result<reqwest::Response>) -> bool {
    matches!(result, Ok(response) if response.status().is_success())
}

/// Extract the set of outbound absolute http(s) URLs present in `body`,
/// using the extraction method appropriate to `format` (spec §4.4). Order is
/// insertion order of first appearance; duplicates are removed.
fn extract_links(body: &str, format: ContentTextFormat) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let mut push = |url: String| {
        if seen.insert(url.clone()) {
            out.push(url);
        }
    };

    match format {
        ContentTextFormat::Html => {
            let document = Html::parse_document(body);
            let selector = Selector::parse("[href]").unwrap();
            for el in document.select(&selector) {
                if let Some(href) = el.value().attr("href") {
                    if is_absolute_http(href) {
                        push(href.to_string());
                    }
                }
            }
        }
        ContentTextFormat::Markdown => {
            for cap in MARKDOWN_LINK_RE.captures_iter(body) {
                push(cap[1].to_string());
            }
            for m in BARE_URL_RE.find_iter(body) {
                push(m.as_str().to_string());
            }
        }
        ContentTextFormat::Text => {
            for m in BARE_URL_RE.find_iter(body) {
                push(m.as_str().to_string());
            }
        }
    }

    out
}

fn is_absolute_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_extraction_collects_absolute_hrefs_only() {
        let html = r#"<a href="https://a.example/1">a</a><a href="/relative">b</a><a href="http://b.example/2">c</a>"#;
        let links = extract_links(html, ContentTextFormat::Html);
        assert_eq!(links, vec!["https://a.example/1", "http://b.example/2"]);
    }

    #[test]
    fn markdown_extraction_collects_link_targets_and_bare_urls() {
        let md = "see [here](https://a.example/1) and also https://b.example/2 plain";
        let links = extract_links(md, ContentTextFormat::Markdown);
        assert_eq!(links, vec!["https://a.example/1", "https://b.example/2"]);
    }

    #[test]
    fn text_extraction_collects_bare_urls_only() {
        let text = "visit https://a.example/1 for more";
        let links = extract_links(text, ContentTextFormat::Text);
        assert_eq!(links, vec!["https://a.example/1"]);
    }

    #[test]
    fn duplicate_links_are_deduplicated_preserving_first_order() {
        let html = r#"<a href="https://a.example/1">a</a><a href="https://a.example/1">b</a>"#;
        let links = extract_links(html, ContentTextFormat::Html);
        assert_eq!(links, vec!["https://a.example/1"]);
    }
}
