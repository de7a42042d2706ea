use std::time::Duration;

use scraper::{Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{Error, Result};
use crate::http_client::{self, DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT};
use crate::mf2::{self, Mf2Item, Mf2Value};
use crate::model::{parse_flexible_datetime, Direction, Mention, MentionType};

/// Parses a Webmention request: fetches `source`, verifies `target` is
/// actually present in its content, and enriches the resulting [`Mention`]
/// with microformats2 and HTML-fallback metadata (spec §4.1).
pub struct Parser {
    base_url: Option<Url>,
    http_timeout: Duration,
    client: reqwest::Client,
}

impl Parser {
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_config(base_url, DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT.to_string())
    }

    pub fn with_config(
        base_url: Option<String>,
        http_timeout: Duration,
        user_agent: String,
    ) -> Result<Self> {
        let base_url = base_url
            .map(|u| Url::parse(&u).map_err(|e| Error::validation(e.to_string())))
            .transpose()?;
        let client = http_client::build_client(&user_agent, http_timeout)?;
        Ok(Self {
            base_url,
            http_timeout,
            client,
        })
    }

    pub async fn parse(&self, source: &str, target: &str) -> Result<Mention> {
        if source.is_empty() || target.is_empty() {
            return Err(Error::validation("Missing source or target URL"));
        }

        if let Some(base) = &self.base_url {
            let target_url = Url::parse(target).map_err(|e| Error::validation(e.to_string()))?;
            if target_url.host_str() != base.host_str() {
                return Err(Error::validation(
                    "Target URL domain does not match server domain",
                ));
            }
        }

        let response = self
            .client
            .get(source)
            .timeout(self.http_timeout)
            .send()
            .await
            .map_err(|e| Error::upstream(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(Error::gone("Source URL not found"));
        }
        if !status.is_success() {
            return Err(Error::upstream(format!("source fetch failed: {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::upstream(e.to_string()))?;

        if !Self::source_mentions_target(&body, target) {
            return Err(Error::gone("Target URL not found in source content"));
        }

        let mut mention = Mention::new(source, target, Direction::In);
        Self::enrich(&mut mention, &body, source, target);
        Ok(mention)
    }

    /// Verify the Webmention REC's exact-match requirement: the target must
    /// appear as the value of some `href`/`src` attribute, or as a raw
    /// substring of the body.
    fn source_mentions_target(body: &str, target: &str) -> bool {
        let document = Html::parse_document(body);
        let href_selector = Selector::parse("[href]").unwrap();
        let src_selector = Selector::parse("[src]").unwrap();

        let attr_match = document
            .select(&href_selector)
            .any(|el| el.value().attr("href") == Some(target))
            || document
                .select(&src_selector)
                .any(|el| el.value().attr("src") == Some(target));

        attr_match || body.contains(target)
    }

    fn enrich(mention: &mut Mention, html: &str, source_url: &str, target_url: &str) {
        if let Some(entry) = Self::extract_h_entry(html, source_url) {
            Self::fill_from_h_entry(mention, &entry, target_url);
        }

        Self::fill_from_html_fallbacks(mention, html);

        if mention.excerpt.is_none() {
            if let Some(content) = &mention.content {
                mention.excerpt = Self::make_excerpt(content, 250);
            }
        }
    }

    fn extract_h_entry(html: &str, source_url: &str) -> Option<Mf2Item> {
        let doc = mf2::parse(html, source_url);
        for item in &doc.items {
            if item.has_type("h-entry") {
                return Some(item.clone());
            }
        }
        for item in &doc.items {
            for child in &item.children {
                if child.has_type("h-entry") {
                    return Some(child.clone());
                }
            }
        }
        None
    }

    fn fill_from_h_entry(mention: &mut Mention, entry: &Mf2Item, target_url: &str) {
        Self::fill_mf2_metadata(mention, entry);
        Self::fill_core_fields(mention, entry);
        Self::fill_author(mention, entry);
        Self::infer_mention_type(mention, entry, target_url);
        Self::fill_comments(mention, entry);

        if mention.excerpt.is_none() {
            if let Some(content) = &mention.content {
                mention.excerpt = Self::make_excerpt(content, 240);
            }
        }
    }

    fn fill_mf2_metadata(mention: &mut Mention, entry: &Mf2Item) {
        let mf2_obj = mention
            .metadata
            .entry("mf2".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let mf2_obj = mf2_obj.as_object_mut().expect("mf2 entry is always an object");

        mf2_obj.insert("type".into(), Value::from(entry.types.clone()));
        mf2_obj.insert("url".into(), opt_str(entry.first_str("url")));
        mf2_obj.insert("uid".into(), opt_str(entry.first_str("uid")));
        mf2_obj.insert("category".into(), Value::from(entry.all_strs("category")));
        mf2_obj.insert(
            "syndication".into(),
            Value::from(entry.all_strs("syndication")),
        );
        mf2_obj.insert(
            "bookmark_of".into(),
            Value::from(entry.all_strs("bookmark-of")),
        );
        mf2_obj.insert("like_of".into(), Value::from(entry.all_strs("like-of")));
        mf2_obj.insert(
            "repost_of".into(),
            Value::from(entry.all_strs("repost-of")),
        );
        mf2_obj.insert(
            "in_reply_to".into(),
            Value::from(entry.all_strs("in-reply-to")),
        );
        mf2_obj.insert(
            "follow_of".into(),
            Value::from(entry.all_strs("follow-of")),
        );
        mf2_obj.insert(
            "quotation_of".into(),
            Value::from(entry.all_strs("quotation-of")),
        );
        mf2_obj.insert("photo".into(), Value::from(entry.all_strs("photo")));
        mf2_obj.insert("featured".into(), Value::from(entry.all_strs("featured")));
        mf2_obj.insert("video".into(), Value::from(entry.all_strs("video")));
        mf2_obj.insert("audio".into(), Value::from(entry.all_strs("audio")));
        mf2_obj.insert("photo_url".into(), opt_str(entry.first_str("photo")));
        mf2_obj.insert("featured_url".into(), opt_str(entry.first_str("featured")));
        mf2_obj.insert("video_url".into(), opt_str(entry.first_str("video")));
        mf2_obj.insert("audio_url".into(), opt_str(entry.first_str("audio")));
        mf2_obj.insert(
            "location".into(),
            location_raw_value(entry.get("location")),
        );
        mf2_obj.insert(
            "location_normalized".into(),
            Self::extract_location(entry).unwrap_or(Value::Null),
        );
    }

    fn extract_location(entry: &Mf2Item) -> Option<Value> {
        let first = entry.get("location").first()?;
        match first {
            Mf2Value::Plain(url) => Some(serde_json::json!({
                "type": Value::Null,
                "name": Value::Null,
                "url": url,
                "latitude": Value::Null,
                "longitude": Value::Null,
            })),
            Mf2Value::Item(item) => Some(serde_json::json!({
                "type": item.types.clone(),
                "name": item.first_str("name"),
                "url": item.first_str("url"),
                "latitude": item.first_str("latitude"),
                "longitude": item.first_str("longitude"),
            })),
        }
    }

    fn fill_core_fields(mention: &mut Mention, entry: &Mf2Item) {
        if mention.title.is_none() {
            mention.title = entry.first_str("name");
        }
        if mention.published.is_none() {
            if let Some(raw) = entry.first_str("published") {
                mention.published = parse_flexible_datetime(&raw);
            }
        }
        if mention.excerpt.is_none() {
            mention.excerpt = entry.first_str("summary");
        }
        if mention.content.is_none() {
            mention.content = entry
                .get("content")
                .first()
                .and_then(Mf2Value::value_or_html)
                .or_else(|| entry.first_str("content"));
        }
    }

    fn fill_author(mention: &mut Mention, entry: &Mf2Item) {
        if mention.author_name.is_some()
            || mention.author_url.is_some()
            || mention.author_photo.is_some()
        {
            return;
        }

        let Some(author) = entry.get("author").first() else {
            return;
        };

        match author {
            Mf2Value::Plain(url) => mention.author_url = Some(url.clone()),
            Mf2Value::Item(card) => {
                mention.author_name = card.first_str("name");
                mention.author_url = card.first_str("url");
                mention.author_photo = card.first_str("photo");
            }
        }
    }

    fn infer_mention_type(mention: &mut Mention, entry: &Mf2Item, target_url: &str) {
        if mention.mention_type != MentionType::Unknown {
            return;
        }

        let matches = |property: &str| entry.all_strs(property).iter().any(|u| u == target_url);

        let raw = if matches("like-of") {
            "like-of"
        } else if matches("repost-of") {
            "repost-of"
        } else if matches("bookmark-of") {
            "bookmark-of"
        } else if matches("in-reply-to") {
            "in-reply-to"
        } else if matches("follow-of") {
            "follow-of"
        } else if entry.first_str("rsvp").is_some() {
            "rsvp"
        } else {
            "mention"
        };

        mention.mention_type_raw = Some(raw.to_string());
        mention.mention_type = MentionType::from_raw(Some(raw));
    }

    fn fill_comments(mention: &mut Mention, entry: &Mf2Item) {
        let comments = entry.get("comment");
        if comments.is_empty() || mention.metadata.contains_key("comments") {
            return;
        }

        let extracted: Vec<Value> = comments
            .iter()
            .filter_map(|c| match c {
                Mf2Value::Plain(url) => Some(serde_json::json!({ "url": url })),
                Mf2Value::Item(item) => {
                    let (author_name, author_url, author_photo) = match item.get("author").first() {
                        Some(Mf2Value::Plain(url)) => (None, Some(url.clone()), None),
                        Some(Mf2Value::Item(card)) => (
                            card.first_str("name"),
                            card.first_str("url"),
                            card.first_str("photo"),
                        ),
                        None => (None, None, None),
                    };
                    let content = item
                        .get("content")
                        .first()
                        .and_then(Mf2Value::value_or_html)
                        .or_else(|| item.first_str("content"));

                    Some(serde_json::json!({
                        "type": item.types.clone(),
                        "name": item.first_str("name"),
                        "url": item.first_str("url"),
                        "published": item.first_str("published"),
                        "content": content,
                        "author": {
                            "name": author_name,
                            "url": author_url,
                            "photo": author_photo,
                        },
                    }))
                }
            })
            .collect();

        mention
            .metadata
            .insert("comments".to_string(), Value::Array(extracted));
    }

    fn fill_from_html_fallbacks(mention: &mut Mention, html: &str) {
        let document = Html::parse_document(html);

        if mention.title.is_none() {
            mention.title = meta_content(&document, r#"meta[property="og:title"]"#)
                .or_else(|| meta_content(&document, r#"meta[name="twitter:title"]"#))
                .or_else(|| {
                    let sel = Selector::parse("title").unwrap();
                    document
                        .select(&sel)
                        .next()
                        .map(|el| el.text().collect::<String>().trim().to_string())
                        .filter(|t| !t.is_empty())
                });
        }

        if mention.author_name.is_none() {
            mention.author_name = meta_content(&document, r#"meta[name="author"]"#);
        }

        if mention.published.is_none() {
            if let Some(raw) = meta_content(&document, r#"meta[property="article:published_time"]"#) {
                mention.published = parse_flexible_datetime(&raw);
            }
        }

        if mention.content.is_none() {
            mention.content = meta_content(&document, r#"meta[property="og:description"]"#);
        }

        if mention.excerpt.is_none() {
            if let Some(content) = &mention.content {
                mention.excerpt = Self::make_excerpt(content, 250);
            }
        }
    }

    fn make_excerpt(content: &str, max_chars: usize) -> Option<String> {
        let collapsed = collapse_whitespace(content);
        if collapsed.is_empty() {
            return None;
        }
        Some(truncate_chars(&collapsed, max_chars))
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_space = false;
    for ch in input.trim().chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            prev_space = false;
            out.push(ch);
        }
    }
    out.trim().to_string()
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

fn opt_str(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn location_raw_value(values: &[Mf2Value]) -> Value {
    Value::Array(
        values
            .iter()
            .map(|v| match v {
                Mf2Value::Plain(s) => Value::from(s.clone()),
                Mf2Value::Item(item) => serde_json::json!({
                    "name": item.first_str("name"),
                    "url": item.first_str("url"),
                }),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_exact_href_mention() {
        let server = MockServer::start().await;
        let target = format!("{}/target", server.uri());
        let html = format!(r#"<html><body><a href="{target}">hi</a></body></html>"#);

        Mock::given(method("GET"))
            .and(path("/source"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let parser = Parser::new(None).unwrap();
        let source = format!("{}/source", server.uri());
        let mention = parser.parse(&source, &target).await.unwrap();

        assert_eq!(mention.direction, Direction::In);
        assert_eq!(mention.mention_type, MentionType::Mention);
    }

    #[tokio::test]
    async fn gone_when_source_returns_410() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/source"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let parser = Parser::new(None).unwrap();
        let source = format!("{}/source", server.uri());
        let err = parser.parse(&source, "https://example.com/t").await.unwrap_err();
        assert!(matches!(err, Error::Gone(_)));
    }

    #[tokio::test]
    async fn gone_when_target_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/source"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>no link</html>"))
            .mount(&server)
            .await;

        let parser = Parser::new(None).unwrap();
        let source = format!("{}/source", server.uri());
        let err = parser
            .parse(&source, "https://example.com/t")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Gone(_)));
    }

    #[tokio::test]
    async fn like_of_sets_type_like() {
        let server = MockServer::start().await;
        let target = format!("{}/target", server.uri());
        let html = format!(
            r#"<html><body><div class="h-entry">
                <a class="u-like-of" href="{target}">liked</a>
            </div></body></html>"#
        );

        Mock::given(method("GET"))
            .and(path("/source"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let parser = Parser::new(None).unwrap();
        let source = format!("{}/source", server.uri());
        let mention = parser.parse(&source, &target).await.unwrap();

        assert_eq!(mention.mention_type, MentionType::Like);
        assert_eq!(mention.mention_type_raw.as_deref(), Some("like-of"));
    }

    #[test]
    fn excerpt_collapses_whitespace_and_truncates() {
        let long = "a".repeat(300);
        let excerpt = Parser::make_excerpt(&format!("  {long}   more  "), 240).unwrap();
        assert_eq!(excerpt.chars().count(), 240);
    }
}
