use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Direction of a [`Mention`] relative to this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// A foreign resource mentions one of ours.
    #[serde(rename = "incoming")]
    In,
    /// One of our resources mentions a foreign one.
    #[serde(rename = "outgoing")]
    Out,
}

impl Direction {
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "incoming" | "in" => Some(Self::In),
            "outgoing" | "out" => Some(Self::Out),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "incoming",
            Self::Out => "outgoing",
        }
    }
}

/// Moderation/delivery status of a [`Mention`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionStatus {
    Pending,
    Confirmed,
    Deleted,
}

impl Default for MentionStatus {
    fn default() -> Self {
        Self::Confirmed
    }
}

/// Semantic kind of a [`Mention`], inferred from the mf2 property that
/// produced it. Not an exhaustive list — the Webmention recommendation
/// itself does not provide a static one — but these are the commonly
/// supported microformats2 post types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionType {
    Unknown,
    Mention,
    Reply,
    Like,
    Repost,
    Bookmark,
    Rsvp,
    Follow,
}

impl Default for MentionType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl MentionType {
    /// Map a raw mf2 property name (`"like-of"`) or short alias (`"like"`) to
    /// a [`MentionType`]. Unknown input (including absence) yields `Unknown`.
    pub fn from_raw(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Unknown;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "in-reply-to" | "reply" => Self::Reply,
            "like-of" | "like" => Self::Like,
            "repost-of" | "repost" => Self::Repost,
            "bookmark-of" | "bookmark" => Self::Bookmark,
            "rsvp" => Self::Rsvp,
            "follow-of" | "follow" => Self::Follow,
            "mention" => Self::Mention,
            _ => Self::Unknown,
        }
    }
}

/// Supported content text formats, used by the outgoing processor to decide
/// how to extract links and by the filesystem watcher to guess a file's
/// format from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentTextFormat {
    Html,
    Markdown,
    Text,
}

/// A normalized Webmention record (spec §3).
///
/// `(source, target, direction)` is the unique key; re-ingestion updates
/// descriptive fields in place but never touches `created_at`, and
/// `direction` is fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub source: String,
    pub target: String,
    pub direction: Direction,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub author_photo: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published: Option<OffsetDateTime>,
    pub status: MentionStatus,
    pub mention_type: MentionType,
    pub mention_type_raw: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Mention {
    /// Construct a bare mention for the given key, with all descriptive
    /// fields absent. Used as the seed the parser enrichment pipeline fills
    /// additively.
    pub fn new(source: impl Into<String>, target: impl Into<String>, direction: Direction) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            direction,
            title: None,
            excerpt: None,
            content: None,
            author_name: None,
            author_url: None,
            author_photo: None,
            published: None,
            status: MentionStatus::Confirmed,
            mention_type: MentionType::Unknown,
            mention_type_raw: None,
            metadata: Map::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// The `(source, target, direction)` key uniquely identifying this
    /// mention (invariant 1).
    pub fn key(&self) -> (String, String, Direction) {
        (self.source.clone(), self.target.clone(), self.direction)
    }

    /// Reconstruct a [`Mention`] from a loosely-typed JSON object, as
    /// produced by `Mention::to_value` or a storage row. Mirrors the
    /// original's `Webmention.build` classmethod: required fields are
    /// asserted present, `mention_type` defaults to `Mention` when absent,
    /// and `mention_type_raw` is derived from it when not separately
    /// supplied.
    pub fn build(data: &Value, direction: Direction) -> Result<Self, String> {
        let obj = data.as_object().ok_or("expected a JSON object")?;
        let source = obj
            .get("source")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or("source is required")?
            .to_string();
        let target = obj
            .get("target")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or("target is required")?
            .to_string();

        let mention_type_raw = obj
            .get("mention_type_raw")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mention_type = obj
            .get("mention_type")
            .and_then(Value::as_str)
            .map(|raw| MentionType::from_raw(Some(raw)))
            .unwrap_or(MentionType::Mention);
        let mention_type_raw = mention_type_raw.or_else(|| {
            Some(
                match mention_type {
                    MentionType::Unknown => "unknown",
                    MentionType::Mention => "mention",
                    MentionType::Reply => "in-reply-to",
                    MentionType::Like => "like-of",
                    MentionType::Repost => "repost-of",
                    MentionType::Bookmark => "bookmark-of",
                    MentionType::Rsvp => "rsvp",
                    MentionType::Follow => "follow-of",
                }
                .to_string(),
            )
        });

        let status = obj
            .get("status")
            .and_then(Value::as_str)
            .and_then(|s| match s {
                "pending" => Some(MentionStatus::Pending),
                "confirmed" => Some(MentionStatus::Confirmed),
                "deleted" => Some(MentionStatus::Deleted),
                _ => None,
            })
            .unwrap_or(MentionStatus::Confirmed);

        let parse_dt = |key: &str| -> Option<OffsetDateTime> {
            let v = obj.get(key)?;
            if let Some(s) = v.as_str() {
                return parse_flexible_datetime(s);
            }
            if let Some(n) = v.as_i64() {
                return OffsetDateTime::from_unix_timestamp(n).ok();
            }
            None
        };

        let str_field = |key: &str| -> Option<String> {
            obj.get(key).and_then(Value::as_str).map(str::to_string)
        };

        let metadata = obj
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            source,
            target,
            direction,
            title: str_field("title"),
            excerpt: str_field("excerpt"),
            content: str_field("content"),
            author_name: str_field("author_name"),
            author_url: str_field("author_url"),
            author_photo: str_field("author_photo"),
            published: parse_dt("published"),
            status,
            mention_type,
            mention_type_raw,
            metadata,
            created_at: parse_dt("created_at"),
            updated_at: parse_dt("updated_at"),
        })
    }

    /// Inverse of [`Mention::build`] — a JSON object representation with
    /// enums lowered to their lowercase string form and timestamps as
    /// RFC 3339, matching the original's `Webmention.to_dict`.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parse an ISO-8601/RFC-3339 timestamp, treating a missing UTC offset as
/// UTC (invariant 2). Accepts both the common `+00:00`/`Z` forms.
pub fn parse_flexible_datetime(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339) {
        return Some(dt);
    }
    // No offset supplied (e.g. "2026-02-07T00:00:00") — assume UTC.
    let naive_formats = [
        time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ),
        time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"
        ),
    ];
    for fmt in naive_formats {
        if let Ok(dt) = time::PrimitiveDateTime::parse(raw, &fmt) {
            return Some(dt.assume_utc());
        }
    }
    None
}

/// Kind of change the filesystem watcher observed for a path (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Edited,
    Deleted,
}

/// A frozen notification emitted by the filesystem watcher and consumed by
/// the filesystem monitor. Transient — never persisted.
#[derive(Debug, Clone)]
pub struct ContentChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub text: Option<String>,
    pub format: Option<ContentTextFormat>,
}
