//! Webmention protocol engine: parsing and verification of incoming
//! mentions, discovery and dispatch of outgoing ones, a storage contract,
//! and a filesystem watcher that drives outgoing dispatch from local
//! content files.

pub mod endpoint;
pub mod error;
pub mod http_client;
pub mod incoming;
pub mod mf2;
pub mod model;
pub mod monitor;
pub mod outgoing;
pub mod parser;
pub mod storage;
pub mod watcher;

pub use error::{Error, Result};
pub use incoming::{IncomingProcessor, MentionCallbacks, NoopCallbacks};
pub use model::{
    ChangeKind, ContentChange, ContentTextFormat, Direction, Mention, MentionStatus, MentionType,
};
pub use monitor::{FileSystemMonitor, PathMapper};
pub use outgoing::OutgoingProcessor;
pub use parser::Parser;
pub use storage::Storage;
pub use watcher::FileSystemWatcher;
