#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Direction, Mention};

/// Durable storage contract for [`Mention`] records (spec §5).
///
/// Implementations must treat `(source, target, direction)` as the unique
/// key: storing a mention that collides with an existing one updates the
/// existing row's descriptive fields and `updated_at`, leaving `created_at`
/// untouched.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn store_webmention(&self, mention: Mention) -> Result<Mention>;

    async fn delete_webmention(&self, source: &str, target: &str, direction: Direction) -> Result<bool>;

    /// All non-deleted mentions for `resource` in the given `direction`.
    /// For `Direction::In`, `resource` is matched against `target`; for
    /// `Direction::Out`, against `source`.
    async fn retrieve_webmentions(&self, resource: &str, direction: Direction) -> Result<Vec<Mention>>;
}

#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::Storage;
    use crate::error::Result;
    use crate::model::{Direction, Mention, MentionStatus};

    /// An in-memory [`Storage`] implementation used by the core crate's own
    /// tests and available to dependants for their own test suites.
    #[derive(Default)]
    pub struct InMemoryStorage {
        mentions: Mutex<Vec<Mention>>,
    }

    impl InMemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl Storage for InMemoryStorage {
        async fn store_webmention(&self, mut mention: Mention) -> Result<Mention> {
            let mut mentions = self.mentions.lock().unwrap();
            let now = OffsetDateTime::now_utc();
            let key = mention.key();

            if let Some(existing) = mentions
                .iter_mut()
                .find(|m| m.key() == key)
            {
                mention.created_at = existing.created_at;
                mention.updated_at = Some(now);
                *existing = mention.clone();
                return Ok(mention);
            }

            mention.created_at = Some(now);
            mention.updated_at = Some(now);
            mentions.push(mention.clone());
            Ok(mention)
        }

        async fn delete_webmention(
            &self,
            source: &str,
            target: &str,
            direction: Direction,
        ) -> Result<bool> {
            let mut mentions = self.mentions.lock().unwrap();
            let mut found = false;
            for m in mentions.iter_mut() {
                if m.source == source && m.target == target && m.direction == direction {
                    m.status = MentionStatus::Deleted;
                    m.updated_at = Some(OffsetDateTime::now_utc());
                    found = true;
                }
            }
            Ok(found)
        }

        async fn retrieve_webmentions(
            &self,
            resource: &str,
            direction: Direction,
        ) -> Result<Vec<Mention>> {
            let mentions = self.mentions.lock().unwrap();
            Ok(mentions
                .iter()
                .filter(|m| m.direction == direction && m.status != MentionStatus::Deleted)
                .filter(|m| match direction {
                    Direction::In => m.target == resource,
                    Direction::Out => m.source == resource,
                })
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trip() {
        let storage = InMemoryStorage::new();
        let mention = Mention::new("https://a.example/post", "https://b.example/post", Direction::In);
        storage.store_webmention(mention).await.unwrap();

        let found = storage
            .retrieve_webmentions("https://b.example/post", Direction::In)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn re_storing_same_key_preserves_created_at() {
        let storage = InMemoryStorage::new();
        let mention = Mention::new("https://a.example/post", "https://b.example/post", Direction::In);
        let first = storage.store_webmention(mention.clone()).await.unwrap();

        let mut second = mention;
        second.title = Some("updated title".to_string());
        let second = storage.store_webmention(second).await.unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.title.as_deref(), Some("updated title"));
    }

    #[tokio::test]
    async fn delete_marks_status_and_excludes_from_retrieval() {
        let storage = InMemoryStorage::new();
        let mention = Mention::new("https://a.example/post", "https://b.example/post", Direction::In);
        storage.store_webmention(mention).await.unwrap();

        let deleted = storage
            .delete_webmention(
                "https://a.example/post",
                "https://b.example/post",
                Direction::In,
            )
            .await
            .unwrap();
        assert!(deleted);

        let found = storage
            .retrieve_webmentions("https://b.example/post", Direction::In)
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
