mod webmention;

pub use webmention::WebmentionService;

use std::sync::Arc;

use crate::types::Dependencies;

#[derive(Clone)]
pub struct Services {
    pub webmention: WebmentionService,
}

impl Services {
    pub fn new(deps: Arc<Dependencies>) -> Self {
        Self {
            webmention: WebmentionService::new(deps),
        }
    }
}
