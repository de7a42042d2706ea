use std::sync::Arc;

use tracing::error;

use crate::error::{Error, Result};
use crate::model::{Direction, Mention, MentionStatus};
use crate::parser::Parser;
use crate::storage::Storage;

/// Hooks invoked after a mention is persisted or deleted. Both methods
/// default to a no-op — implementors only override the ones they care
/// about.
///
/// Callback *errors* are logged and never propagated: a misbehaving
/// integration must not be able to take down mention processing.
#[async_trait::async_trait]
pub trait MentionCallbacks: Send + Sync {
    async fn on_mention_processed(&self, _mention: &Mention) -> Result<()> {
        Ok(())
    }

    async fn on_mention_deleted(&self, _mention: &Mention) -> Result<()> {
        Ok(())
    }
}

/// A [`MentionCallbacks`] that does nothing, used where no integration hooks
/// are configured.
pub struct NoopCallbacks;

#[async_trait::async_trait]
impl MentionCallbacks for NoopCallbacks {}

/// Processes inbound Webmention notifications (spec §4.3): parses the
/// source, applies the configured initial status, and persists the result —
/// or, if the source has gone missing, tombstones any existing record.
pub struct IncomingProcessor {
    parser: Parser,
    storage: Arc<dyn Storage>,
    callbacks: Arc<dyn MentionCallbacks>,
    initial_status: MentionStatus,
}

impl IncomingProcessor {
    pub fn new(parser: Parser, storage: Arc<dyn Storage>) -> Self {
        Self {
            parser,
            storage,
            callbacks: Arc::new(NoopCallbacks),
            initial_status: MentionStatus::Confirmed,
        }
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn MentionCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Override the status newly-processed mentions are stored with.
    /// `Pending` lets an integrator hold mentions for moderation inside
    /// `on_mention_processed` before re-persisting as `Confirmed`/`Deleted`.
    pub fn with_initial_status(mut self, status: MentionStatus) -> Self {
        self.initial_status = status;
        self
    }

    pub async fn process(&self, source: &str, target: &str) -> Result<Mention> {
        match self.parser.parse(source, target).await {
            Ok(mut mention) => {
                mention.status = self.initial_status;
                let stored = self.storage.store_webmention(mention).await?;

                if let Err(err) = self.callbacks.on_mention_processed(&stored).await {
                    error!(error = %err, source, target, "on_mention_processed callback failed");
                }

                Ok(stored)
            }
            Err(Error::Gone(reason)) => {
                self.storage
                    .delete_webmention(source, target, Direction::In)
                    .await?;

                let tombstone = Mention::new(source, target, Direction::In);
                if let Err(err) = self.callbacks.on_mention_deleted(&tombstone).await {
                    error!(error = %err, source, target, "on_mention_deleted callback failed");
                }

                Err(Error::Gone(reason))
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStorage;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn stores_mention_with_configured_initial_status() {
        let server = MockServer::start().await;
        let target = format!("{}/target", server.uri());
        let html = format!(r#"<html><body><a href="{target}">hi</a></body></html>"#);
        Mock::given(method("GET"))
            .and(path("/source"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let parser = Parser::new(None).unwrap();
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let processor = IncomingProcessor::new(parser, storage.clone())
            .with_initial_status(MentionStatus::Pending);

        let source = format!("{}/source", server.uri());
        let mention = processor.process(&source, &target).await.unwrap();
        assert_eq!(mention.status, MentionStatus::Pending);

        let found = storage
            .retrieve_webmentions(&target, Direction::In)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn gone_source_tombstones_existing_mention() {
        let server = MockServer::start().await;
        let target = format!("{}/target", server.uri());
        Mock::given(method("GET"))
            .and(path("/source"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let parser = Parser::new(None).unwrap();
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let source = format!("{}/source", server.uri());

        storage
            .store_webmention(Mention::new(&source, &target, Direction::In))
            .await
            .unwrap();

        let processor = IncomingProcessor::new(parser, storage.clone());
        let err = processor.process(&source, &target).await.unwrap_err();
        assert!(matches!(err, Error::Gone(_)));

        let found = storage.retrieve_webmentions(&target, Direction::In).await.unwrap();
        assert!(found.is_empty());
    }
}
