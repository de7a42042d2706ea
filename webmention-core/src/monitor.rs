use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::error;

use crate::model::{ChangeKind, ContentChange};
use crate::outgoing::OutgoingProcessor;
use crate::watcher::FileSystemWatcher;

/// Maps a locally-watched file path to the public URL of the resource it
/// renders as. A `None` result means the path has no corresponding
/// resource and its changes are silently dropped (spec §4.6).
pub type PathMapper = Box<dyn Fn(&Path) -> Option<String> + Send + Sync>;

/// Wires a [`FileSystemWatcher`] to an [`OutgoingProcessor`]: every accepted
/// content change is translated into an outgoing-processor dispatch for the
/// mapped resource URL (spec §4.6).
pub struct FileSystemMonitor {
    watcher: FileSystemWatcher,
}

impl FileSystemMonitor {
    pub fn new(
        root: impl Into<std::path::PathBuf>,
        processor: Arc<OutgoingProcessor>,
        mapper: PathMapper,
        runtime: Handle,
    ) -> Self {
        let mapper = Arc::new(mapper);
        let watcher = FileSystemWatcher::new(root, move |change: ContentChange| {
            let processor = processor.clone();
            let mapper = mapper.clone();
            runtime.spawn(async move {
                handle_change(processor, mapper.as_ref(), change).await;
            });
        });

        Self { watcher }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.watcher = self.watcher.with_extensions(extensions);
        self
    }

    pub fn with_debounce(mut self, debounce: std::time::Duration) -> Self {
        self.watcher = self.watcher.with_debounce(debounce);
        self
    }

    pub fn start(&self) {
        self.watcher.start();
    }

    pub fn stop(&self) {
        self.watcher.stop();
    }
}

async fn handle_change(processor: Arc<OutgoingProcessor>, mapper: &PathMapper, change: ContentChange) {
    let Some(resource_url) = mapper(&change.path) else {
        return;
    };

    let (text, format) = match change.kind {
        // A deleted file notifies the outgoing processor with empty text so
        // every previously-recorded target is treated as removed.
        ChangeKind::Deleted => (Some(String::new()), change.format),
        ChangeKind::Added | ChangeKind::Edited => (change.text, change.format),
    };

    match processor.process(&resource_url, text, format).await {
        Ok(handles) => {
            if handles.is_empty() {
                return;
            }
        }
        Err(err) => {
            error!(error = %err, resource_url, "outgoing processor failed for watched file change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointDiscoverer;
    use crate::model::Direction;
    use crate::storage::memory::InMemoryStorage;
    use std::time::Duration;
    use tempfile::tempdir;

    fn processor(storage: Arc<dyn crate::storage::Storage>) -> Arc<OutgoingProcessor> {
        let client = reqwest::Client::new();
        let discoverer = EndpointDiscoverer::new().unwrap();
        Arc::new(OutgoingProcessor::new(client, discoverer, storage))
    }

    #[tokio::test]
    async fn unmapped_path_is_dropped_without_dispatch() {
        let dir = tempdir().unwrap();
        let storage: Arc<dyn crate::storage::Storage> = Arc::new(InMemoryStorage::new());
        let runtime = Handle::current();
        let monitor = FileSystemMonitor::new(
            dir.path(),
            processor(storage.clone()),
            Box::new(|_path| None),
            runtime,
        )
        .with_debounce(Duration::from_millis(100));

        monitor.start();
        std::fs::write(dir.path().join("post.md"), "hello").unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        monitor.stop();

        let found = storage
            .retrieve_webmentions("https://example.com/post", Direction::Out)
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}

