use std::sync::Arc;

use webmention_core::{Direction, Mention};

use crate::error::AppError;
use crate::types::Dependencies;

#[derive(Clone)]
pub struct WebmentionService {
    deps: Arc<Dependencies>,
}

impl WebmentionService {
    pub fn new(deps: Arc<Dependencies>) -> Self {
        Self { deps }
    }

    pub async fn process(&self, source: &str, target: &str) -> Result<Mention, AppError> {
        let mention = self.deps.incoming.process(source, target).await?;
        Ok(mention)
    }

    pub async fn list(&self, resource: &str, direction: Direction) -> Result<Vec<Mention>, AppError> {
        let mentions = self.deps.storage.retrieve_webmentions(resource, direction).await?;
        Ok(mentions)
    }
}
