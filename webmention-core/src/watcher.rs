use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, warn};

use crate::model::{ChangeKind, ContentChange, ContentTextFormat};

/// File extensions monitored by default (spec §4.5), matched case-insensitively.
pub const DEFAULT_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "html", "htm"];

/// Default debounce interval (spec §4.5).
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

enum RawEvent {
    Changed { path: PathBuf, kind: ChangeKind },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    Idle,
    Running,
}

/// Watches a directory tree for changes to content files and emits debounced
/// [`ContentChange`] notifications (spec §4.5).
///
/// All debounce bookkeeping lives on a single dedicated OS thread; the
/// `notify` callback only ever pushes onto a thread-safe queue.
pub struct FileSystemWatcher {
    root: PathBuf,
    sink: Arc<dyn Fn(ContentChange) + Send + Sync>,
    extensions: Vec<String>,
    debounce: Duration,
    state: Mutex<WatcherState>,
    handle: Mutex<Option<WorkerHandle>>,
}

struct WorkerHandle {
    _watcher: RecommendedWatcher,
    stop_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl FileSystemWatcher {
    pub fn new(root: impl Into<PathBuf>, sink: impl Fn(ContentChange) + Send + Sync + 'static) -> Self {
        Self {
            root: root.into(),
            sink: Arc::new(sink),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            debounce: DEFAULT_DEBOUNCE,
            state: Mutex::new(WatcherState::Idle),
            handle: Mutex::new(None),
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Begin watching. A no-op if the root doesn't exist, or if already
    /// running (spec §4.5 state machine).
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == WatcherState::Running {
            return;
        }
        if !self.root.exists() {
            warn!(root = %self.root.display(), "watcher root does not exist, staying idle");
            return;
        }

        let (event_tx, event_rx) = mpsc::channel::<RawEvent>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let root_for_cb = self.root.clone();
        let extensions_for_cb = self.extensions.clone();
        let watcher_result = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        error!(error = %err, "filesystem watch error");
                        return;
                    }
                };
                for (path, kind) in translate_event(&event) {
                    if accepts(&path, &root_for_cb, &extensions_for_cb) {
                        let _ = event_tx.send(RawEvent::Changed { path, kind });
                    }
                }
            },
            notify::Config::default(),
        );

        let mut watcher = match watcher_result {
            Ok(w) => w,
            Err(err) => {
                error!(error = %err, "failed to construct filesystem watcher");
                return;
            }
        };

        if let Err(err) = watcher.watch(&self.root, RecursiveMode::Recursive) {
            error!(error = %err, root = %self.root.display(), "failed to watch root directory");
            return;
        }

        let sink = self.sink.clone();
        let debounce = self.debounce;
        let join = thread::spawn(move || {
            run_debounce_loop(event_rx, stop_rx, sink, debounce);
        });

        *self.handle.lock().unwrap() = Some(WorkerHandle {
            _watcher: watcher,
            stop_tx,
            join,
        });
        *state = WatcherState::Running;
    }

    /// Stop watching. A no-op if already idle (spec §4.5 state machine).
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == WatcherState::Idle {
            return;
        }

        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.stop_tx.send(());
            let _ = handle.join.join();
        }
        *state = WatcherState::Idle;
    }
}

impl Drop for FileSystemWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn translate_event(event: &notify::Event) -> Vec<(PathBuf, ChangeKind)> {
    use notify::event::{ModifyKind, RenameMode};

    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), ChangeKind::Added))
            .collect(),
        // A rename/move is decomposed into deleted(src) + created(dst) per
        // spec §4.5, rather than folded into an ordinary edit.
        EventKind::Modify(ModifyKind::Name(rename_mode)) => match rename_mode {
            RenameMode::Both => event
                .paths
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let kind = if i == 0 { ChangeKind::Deleted } else { ChangeKind::Added };
                    (p.clone(), kind)
                })
                .collect(),
            RenameMode::From => event
                .paths
                .iter()
                .map(|p| (p.clone(), ChangeKind::Deleted))
                .collect(),
            RenameMode::To => event
                .paths
                .iter()
                .map(|p| (p.clone(), ChangeKind::Added))
                .collect(),
            // `Any`/`Other`: the platform didn't tell us which half of the
            // rename this path is, so fall back to whether it still exists.
            RenameMode::Any | RenameMode::Other => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() { ChangeKind::Added } else { ChangeKind::Deleted };
                    (p.clone(), kind)
                })
                .collect(),
        },
        EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), ChangeKind::Edited))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), ChangeKind::Deleted))
            .collect(),
        _ => Vec::new(),
    }
}

fn accepts(path: &Path, root: &Path, extensions: &[String]) -> bool {
    let path_str = path.to_string_lossy();
    if path_str.is_empty() {
        return false;
    }
    if !path.starts_with(root) {
        return false;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
}

struct PathState {
    last_event_at: Instant,
    last_event_kind: ChangeKind,
}

fn run_debounce_loop(
    events: mpsc::Receiver<RawEvent>,
    stop: mpsc::Receiver<()>,
    sink: Arc<dyn Fn(ContentChange) + Send + Sync>,
    debounce: Duration,
) {
    let mut pending: HashMap<PathBuf, PathState> = HashMap::new();
    let mut last_processed_at: HashMap<PathBuf, Instant> = HashMap::new();
    let tick = debounce.min(Duration::from_millis(500)).max(Duration::from_millis(50));

    loop {
        if stop.try_recv().is_ok() {
            return;
        }

        match events.recv_timeout(tick) {
            Ok(RawEvent::Changed { path, kind }) => {
                pending.insert(
                    path,
                    PathState {
                        last_event_at: Instant::now(),
                        last_event_kind: kind,
                    },
                );
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }

        flush_ready(&mut pending, &mut last_processed_at, &sink, debounce);
    }
}

fn flush_ready(
    pending: &mut HashMap<PathBuf, PathState>,
    last_processed_at: &mut HashMap<PathBuf, Instant>,
    sink: &Arc<dyn Fn(ContentChange) + Send + Sync>,
    debounce: Duration,
) {
    let now = Instant::now();
    let ready: Vec<PathBuf> = pending
        .iter()
        .filter(|(path, state)| {
            let age_since_event = now.duration_since(state.last_event_at);
            let age_since_processed = last_processed_at
                .get(*path)
                .map(|t| now.duration_since(*t))
                .unwrap_or(Duration::MAX);
            age_since_event >= debounce && age_since_processed >= debounce
        })
        .map(|(path, _)| path.clone())
        .collect();

    for path in ready {
        let state = pending.remove(&path).expect("path was just observed in pending");
        let change = build_content_change(&path, state.last_event_kind);
        last_processed_at.insert(path, now);

        if let Some(change) = change {
            sink(change);
        }
    }
}

fn build_content_change(path: &Path, kind: ChangeKind) -> Option<ContentChange> {
    if kind == ChangeKind::Deleted || !path.exists() {
        return Some(ContentChange {
            kind: ChangeKind::Deleted,
            path: path.to_path_buf(),
            text: None,
            format: None,
        });
    }

    let format = guess_format(path)?;
    let text = std::fs::read_to_string(path).ok();

    Some(ContentChange {
        kind,
        path: path.to_path_buf(),
        text,
        format: Some(format),
    })
}

fn guess_format(path: &Path) -> Option<ContentTextFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => Some(ContentTextFormat::Html),
        "md" | "markdown" => Some(ContentTextFormat::Markdown),
        "txt" | "text" => Some(ContentTextFormat::Text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    #[test]
    fn start_on_missing_root_stays_idle() {
        let watcher = FileSystemWatcher::new("/nonexistent/path/for/test", |_| {});
        watcher.start();
        assert_eq!(*watcher.state.lock().unwrap(), WatcherState::Idle);
    }

    #[test]
    fn start_stop_is_idempotent() {
        let dir = tempdir().unwrap();
        let watcher = FileSystemWatcher::new(dir.path(), |_| {});
        watcher.start();
        watcher.start();
        watcher.stop();
        watcher.stop();
    }

    #[test]
    fn detects_new_markdown_file() {
        let dir = tempdir().unwrap();
        let (tx, rx) = channel();
        let watcher = FileSystemWatcher::new(dir.path(), move |change| {
            let _ = tx.send(change);
        })
        .with_debounce(StdDuration::from_millis(100));
        watcher.start();

        let file_path = dir.path().join("post.md");
        std::fs::write(&file_path, "hello world").unwrap();

        let change = rx
            .recv_timeout(StdDuration::from_secs(5))
            .expect("expected a debounced ContentChange");
        assert_eq!(change.kind, ChangeKind::Added);
        assert_eq!(change.format, Some(ContentTextFormat::Markdown));
        assert_eq!(change.text.as_deref(), Some("hello world"));

        watcher.stop();
    }

    #[test]
    fn ignores_unmonitored_extension() {
        let dir = tempdir().unwrap();
        let (tx, rx) = channel();
        let watcher = FileSystemWatcher::new(dir.path(), move |change| {
            let _ = tx.send(change);
        })
        .with_debounce(StdDuration::from_millis(100));
        watcher.start();

        std::fs::write(dir.path().join("data.bin"), [0u8, 1, 2]).unwrap();

        let result = rx.recv_timeout(StdDuration::from_millis(500));
        assert!(result.is_err(), "unmonitored extension should not trigger a change");

        watcher.stop();
    }
}
