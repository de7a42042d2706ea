//! A small, purpose-built microformats2 parser.
//!
//! The original Python implementation depends on `mf2py`; no crate in this
//! workspace's dependency tree offers an equivalent, so this module
//! implements the subset of the microformats2 parsing algorithm the parser
//! (§4.1) actually needs — item discovery by `h-*` class, and property
//! discovery by `p-`/`u-`/`dt-`/`e-` prefix — directly over a
//! [`scraper::Html`] document, the same HTML parsing crate already used
//! elsewhere for meta-tag extraction.
//!
//! This is deliberately not a complete implementation of the microformats2
//! parsing specification (implied properties, `value-class-pattern`,
//! backcompat vocabularies are all out of scope, per `spec.md`'s
//! non-goals) — only what §4.1 exercises.

use std::collections::HashMap;

use scraper::{ElementRef, Html};
use url::Url;

/// A single extracted property value: either plain text/URL, or a nested
/// microformats2 item (e.g. an `h-card` author, an `h-cite` comment).
#[derive(Debug, Clone)]
pub enum Mf2Value {
    Plain(String),
    Item(Box<Mf2Item>),
}

impl Mf2Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Mf2Value::Plain(s) => Some(s.as_str()),
            Mf2Value::Item(_) => None,
        }
    }
}

/// A parsed microformats2 item: its `h-*` types and its `p-`/`u-`/`dt-`/`e-`
/// properties (each property is a list, per the mf2 JSON convention).
#[derive(Debug, Clone, Default)]
pub struct Mf2Item {
    pub types: Vec<String>,
    pub properties: HashMap<String, Vec<Mf2Value>>,
    /// Nested items that were not themselves bound to a property name on
    /// this item (e.g. an `h-entry` nested inside an `h-feed`).
    pub children: Vec<Mf2Item>,
}

impl Mf2Item {
    pub fn has_type(&self, ty: &str) -> bool {
        self.types.iter().any(|t| t == ty)
    }

    pub fn get(&self, property: &str) -> &[Mf2Value] {
        self.properties
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First-string extraction helper (spec §4.1): strings pass through,
    /// nested items use `value()` then `url`, lists recurse on element 0.
    pub fn first_str(&self, property: &str) -> Option<String> {
        first_str_value(self.get(property).first())
    }

    /// All plain-string values of a (typically list-like) property, e.g.
    /// `category`, `syndication`.
    pub fn all_strs(&self, property: &str) -> Vec<String> {
        self.get(property)
            .iter()
            .filter_map(Mf2Value::as_str)
            .map(str::to_string)
            .collect()
    }
}

fn first_str_value(value: Option<&Mf2Value>) -> Option<String> {
    match value? {
        Mf2Value::Plain(s) => Some(s.clone()),
        Mf2Value::Item(item) => item
            .first_str("value")
            .or_else(|| item.first_str("url")),
    }
}

/// Top-level parse result: the document's top-level mf2 items.
pub struct Mf2Document {
    pub items: Vec<Mf2Item>,
}

/// Parse the microformats2 items in `html`. `base_url` is used to resolve
/// relative `u-` (URL) property hrefs/srcs.
pub fn parse(html: &str, base_url: &str) -> Mf2Document {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let root = document.root_element();
    let mut items = Vec::new();
    collect_top_level_items(root, &base, &mut items);
    Mf2Document { items }
}

fn h_classes(el: ElementRef) -> Vec<String> {
    el.value()
        .classes()
        .filter(|c| c.starts_with("h-"))
        .map(str::to_string)
        .collect()
}

fn collect_top_level_items(el: ElementRef, base: &Option<Url>, out: &mut Vec<Mf2Item>) {
    for child in el.children().filter_map(ElementRef::wrap) {
        let classes = h_classes(child);
        if !classes.is_empty() {
            out.push(parse_item(child, classes, base));
        } else {
            collect_top_level_items(child, base, out);
        }
    }
}

fn parse_item(el: ElementRef, types: Vec<String>, base: &Option<Url>) -> Mf2Item {
    let mut properties: HashMap<String, Vec<Mf2Value>> = HashMap::new();
    let mut children = Vec::new();
    walk_properties(el, base, &mut properties, &mut children);
    Mf2Item {
        types,
        properties,
        children,
    }
}

fn walk_properties(
    el: ElementRef,
    base: &Option<Url>,
    properties: &mut HashMap<String, Vec<Mf2Value>>,
    children: &mut Vec<Mf2Item>,
) {
    for child in el.children().filter_map(ElementRef::wrap) {
        let nested_types = h_classes(child);
        if !nested_types.is_empty() {
            let nested_item = parse_item(child, nested_types, base);
            for (prefix, name) in property_prefixes(child) {
                let _ = prefix;
                properties
                    .entry(name)
                    .or_default()
                    .push(Mf2Value::Item(Box::new(nested_item.clone())));
            }
            children.push(nested_item);
            continue;
        }

        let mut claimed = false;
        for (prefix, name) in property_prefixes(child) {
            claimed = true;
            let value = extract_property_value(child, prefix, base);
            if let Some(value) = value {
                properties.entry(name).or_default().push(value);
            }
        }

        if !claimed {
            walk_properties(child, base, properties, children);
        }
    }
}

/// Return the `(prefix, property_name)` pairs for every `p-`/`u-`/`dt-`/`e-`
/// class token on this element (an element may carry more than one, e.g.
/// `class="p-name u-url"`).
fn property_prefixes(el: ElementRef) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    for class in el.value().classes() {
        if let Some(rest) = class.strip_prefix("dt-") {
            out.push(("dt-", rest.to_string()));
        } else if let Some(rest) = class.strip_prefix("u-") {
            out.push(("u-", rest.to_string()));
        } else if let Some(rest) = class.strip_prefix("e-") {
            out.push(("e-", rest.to_string()));
        } else if let Some(rest) = class.strip_prefix("p-") {
            out.push(("p-", rest.to_string()));
        }
    }
    out
}

fn text_content(el: ElementRef) -> String {
    el.text().collect::<Vec<_>>().join("").trim().to_string()
}

fn extract_property_value(el: ElementRef, prefix: &str, base: &Option<Url>) -> Option<Mf2Value> {
    match prefix {
        "u-" => {
            let raw = el
                .value()
                .attr("href")
                .or_else(|| el.value().attr("src"))
                .map(str::to_string)
                .unwrap_or_else(|| text_content(el));
            if raw.is_empty() {
                return None;
            }
            let resolved = match base {
                Some(base) => base
                    .join(&raw)
                    .map(|u| u.to_string())
                    .unwrap_or(raw),
                None => raw,
            };
            Some(Mf2Value::Plain(resolved))
        }
        "dt-" => {
            let raw = el
                .value()
                .attr("datetime")
                .map(str::to_string)
                .unwrap_or_else(|| text_content(el));
            if raw.is_empty() {
                None
            } else {
                Some(Mf2Value::Plain(raw))
            }
        }
        "e-" => {
            let value = text_content(el);
            let html = el.inner_html();
            let mut item = Mf2Item::default();
            item.properties
                .insert("value".to_string(), vec![Mf2Value::Plain(value)]);
            item.properties
                .insert("html".to_string(), vec![Mf2Value::Plain(html)]);
            Some(Mf2Value::Item(Box::new(item)))
        }
        _ => {
            let text = text_content(el);
            if text.is_empty() {
                None
            } else {
                Some(Mf2Value::Plain(text))
            }
        }
    }
}

impl Mf2Value {
    /// Convenience for `e-` properties materialized as `{value, html}`
    /// pseudo-items (spec §4.1's `content` extraction: "its `value` or
    /// `html`, or the string itself").
    pub fn value_or_html(&self) -> Option<String> {
        match self {
            Mf2Value::Plain(s) => Some(s.clone()),
            Mf2Value::Item(item) => item
                .first_str("value")
                .or_else(|| item.first_str("html")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_top_level_h_entry() {
        let html = r#"<html><body><div class="h-entry"><p class="p-name">Hi</p></div></body></html>"#;
        let doc = parse(html, "https://example.com/");
        assert_eq!(doc.items.len(), 1);
        assert!(doc.items[0].has_type("h-entry"));
        assert_eq!(doc.items[0].first_str("name").as_deref(), Some("Hi"));
    }

    #[test]
    fn finds_nested_h_entry_inside_h_feed() {
        let html = r#"<html><body><div class="h-feed"><div class="h-entry"><p class="p-name">Child</p></div></div></body></html>"#;
        let doc = parse(html, "https://example.com/");
        assert_eq!(doc.items.len(), 1);
        assert!(doc.items[0].has_type("h-feed"));
        assert_eq!(doc.items[0].children.len(), 1);
        assert!(doc.items[0].children[0].has_type("h-entry"));
    }

    #[test]
    fn resolves_relative_u_url_against_base() {
        let html = r#"<html><body><div class="h-entry"><a class="u-url" href="/post/1">link</a></div></body></html>"#;
        let doc = parse(html, "https://example.com/blog/");
        let url = doc.items[0].first_str("url").unwrap();
        assert_eq!(url, "https://example.com/post/1");
    }

    #[test]
    fn nested_author_h_card_binds_as_property_and_child() {
        let html = r#"<html><body><div class="h-entry">
            <a class="p-author h-card" href="https://example.com/alice">Alice</a>
        </div></body></html>"#;
        let doc = parse(html, "https://example.com/");
        let author = doc.items[0].get("author");
        assert_eq!(author.len(), 1);
        match &author[0] {
            Mf2Value::Item(card) => {
                assert!(card.has_type("h-card"));
            }
            _ => panic!("expected nested item"),
        }
    }
}
