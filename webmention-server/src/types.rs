use std::sync::Arc;

use serde::{Deserialize, Serialize};
use webmention_core::{IncomingProcessor, Mention};

#[derive(Clone)]
pub struct AppState {
    pub services: crate::services::Services,
}

/// Shared collaborators threaded through [`crate::services::Services`].
pub struct Dependencies {
    pub incoming: IncomingProcessor,
    pub storage: Arc<dyn webmention_core::Storage>,
}

#[derive(Deserialize)]
pub struct WebmentionRequest {
    pub source: String,
    pub target: String,
}

#[derive(Serialize)]
pub struct WebmentionAcceptedResponse {
    pub status: &'static str,
}

#[derive(Deserialize)]
pub struct ListWebmentionsParams {
    pub resource: String,
    pub direction: String,
}

#[derive(Serialize)]
pub struct WebmentionView {
    pub source: String,
    pub target: String,
    pub direction: String,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub published: Option<String>,
    pub mention_type: String,
}

impl From<Mention> for WebmentionView {
    fn from(mention: Mention) -> Self {
        Self {
            source: mention.source,
            target: mention.target,
            direction: mention.direction.as_str().to_string(),
            title: mention.title,
            excerpt: mention.excerpt,
            author_name: mention.author_name,
            author_url: mention.author_url,
            published: mention
                .published
                .and_then(|dt| dt.format(&time::format_description::well_known::Rfc3339).ok()),
            mention_type: mention.mention_type_raw.unwrap_or_else(|| "mention".to_string()),
        }
    }
}
