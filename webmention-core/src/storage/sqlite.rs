use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;

use async_trait::async_trait;
use std::path::Path;

use super::Storage;
use crate::error::{Error, Result};
use crate::model::{Direction, Mention, MentionStatus, MentionType};

/// `sqlx`-backed [`Storage`] implementation over SQLite, mirroring the
/// teacher's `init_db`/connection-pool setup in `main.rs`.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(path.as_ref())
                    .create_if_missing(true),
            )
            .await
            .map_err(Error::from)?;

        let storage = Self { pool };
        storage.init().await?;
        Ok(storage)
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS webmentions (
                source TEXT NOT NULL,
                target TEXT NOT NULL,
                direction TEXT NOT NULL,
                title TEXT,
                excerpt TEXT,
                content TEXT,
                author_name TEXT,
                author_url TEXT,
                author_photo TEXT,
                published TEXT,
                status TEXT NOT NULL,
                mention_type TEXT NOT NULL,
                mention_type_raw TEXT,
                metadata TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (source, target, direction)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_webmentions_target_direction ON webmentions(target, direction);",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_webmentions_source_direction ON webmentions(source, direction);",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(())
    }

    fn row_to_mention(row: SqliteRow) -> Result<Mention> {
        let direction_raw: String = row.try_get("direction").map_err(Error::from)?;
        let direction = Direction::from_raw(&direction_raw)
            .ok_or_else(|| Error::storage(format!("unknown direction: {direction_raw}")))?;

        let status_raw: String = row.try_get("status").map_err(Error::from)?;
        let status = match status_raw.as_str() {
            "pending" => MentionStatus::Pending,
            "deleted" => MentionStatus::Deleted,
            _ => MentionStatus::Confirmed,
        };

        let mention_type_raw: Option<String> = row.try_get("mention_type_raw").map_err(Error::from)?;
        let mention_type_str: String = row.try_get("mention_type").map_err(Error::from)?;
        let mention_type = MentionType::from_raw(Some(&mention_type_str));

        let metadata_json: String = row.try_get("metadata").map_err(Error::from)?;
        let metadata = serde_json::from_str(&metadata_json)
            .map_err(|e| Error::storage(format!("corrupt metadata column: {e}")))?;

        Ok(Mention {
            source: row.try_get("source").map_err(Error::from)?,
            target: row.try_get("target").map_err(Error::from)?,
            direction,
            title: row.try_get("title").map_err(Error::from)?,
            excerpt: row.try_get("excerpt").map_err(Error::from)?,
            content: row.try_get("content").map_err(Error::from)?,
            author_name: row.try_get("author_name").map_err(Error::from)?,
            author_url: row.try_get("author_url").map_err(Error::from)?,
            author_photo: row.try_get("author_photo").map_err(Error::from)?,
            published: parse_column_dt(row.try_get("published").map_err(Error::from)?),
            status,
            mention_type,
            mention_type_raw,
            metadata,
            created_at: parse_column_dt(row.try_get("created_at").map_err(Error::from)?),
            updated_at: parse_column_dt(row.try_get("updated_at").map_err(Error::from)?),
        })
    }
}

fn parse_column_dt(raw: Option<String>) -> Option<OffsetDateTime> {
    raw.and_then(|s| crate::model::parse_flexible_datetime(&s))
}

fn format_dt(dt: Option<OffsetDateTime>) -> Option<String> {
    dt.and_then(|dt| dt.format(&time::format_description::well_known::Rfc3339).ok())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn store_webmention(&self, mut mention: Mention) -> Result<Mention> {
        let existing: Option<(String, String)> = sqlx::query_as(
            "SELECT created_at, updated_at FROM webmentions WHERE source = ?1 AND target = ?2 AND direction = ?3",
        )
        .bind(&mention.source)
        .bind(&mention.target)
        .bind(mention.direction.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)?;

        let now = OffsetDateTime::now_utc();
        mention.updated_at = Some(now);
        if let Some((created_at, _)) = &existing {
            mention.created_at = crate::model::parse_flexible_datetime(created_at);
        } else {
            mention.created_at = Some(now);
        }

        let metadata_json = serde_json::to_string(&mention.metadata)
            .map_err(|e| Error::storage(format!("serialize metadata: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO webmentions (
                source, target, direction, title, excerpt, content,
                author_name, author_url, author_photo, published,
                status, mention_type, mention_type_raw, metadata,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT (source, target, direction) DO UPDATE SET
                title = excluded.title,
                excerpt = excluded.excerpt,
                content = excluded.content,
                author_name = excluded.author_name,
                author_url = excluded.author_url,
                author_photo = excluded.author_photo,
                published = excluded.published,
                status = excluded.status,
                mention_type = excluded.mention_type,
                mention_type_raw = excluded.mention_type_raw,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&mention.source)
        .bind(&mention.target)
        .bind(mention.direction.as_str())
        .bind(&mention.title)
        .bind(&mention.excerpt)
        .bind(&mention.content)
        .bind(&mention.author_name)
        .bind(&mention.author_url)
        .bind(&mention.author_photo)
        .bind(format_dt(mention.published))
        .bind(match mention.status {
            MentionStatus::Pending => "pending",
            MentionStatus::Confirmed => "confirmed",
            MentionStatus::Deleted => "deleted",
        })
        .bind(match mention.mention_type {
            MentionType::Unknown => "unknown",
            MentionType::Mention => "mention",
            MentionType::Reply => "in-reply-to",
            MentionType::Like => "like-of",
            MentionType::Repost => "repost-of",
            MentionType::Bookmark => "bookmark-of",
            MentionType::Rsvp => "rsvp",
            MentionType::Follow => "follow-of",
        })
        .bind(&mention.mention_type_raw)
        .bind(&metadata_json)
        .bind(format_dt(mention.created_at))
        .bind(format_dt(mention.updated_at))
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(mention)
    }

    async fn delete_webmention(&self, source: &str, target: &str, direction: Direction) -> Result<bool> {
        let now = format_dt(Some(OffsetDateTime::now_utc()));
        let result = sqlx::query(
            "UPDATE webmentions SET status = 'deleted', updated_at = ?1 WHERE source = ?2 AND target = ?3 AND direction = ?4",
        )
        .bind(now)
        .bind(source)
        .bind(target)
        .bind(direction.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn retrieve_webmentions(&self, resource: &str, direction: Direction) -> Result<Vec<Mention>> {
        let column = match direction {
            Direction::In => "target",
            Direction::Out => "source",
        };
        let query = format!(
            "SELECT * FROM webmentions WHERE {column} = ?1 AND direction = ?2 AND status != 'deleted' ORDER BY created_at DESC"
        );

        let rows = sqlx::query(&query)
            .bind(resource)
            .bind(direction.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from)?;

        rows.into_iter().map(Self::row_to_mention).collect()
    }
}
