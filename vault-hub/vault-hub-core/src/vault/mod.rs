//! The storage capability consumed by the engine.
//!
//! Everything above this trait treats the vault as a set of `/`-separated
//! relative paths. Metadata reads come in two flavors: fresh parses of file
//! content (ground truth) and the host's eventually-consistent metadata
//! index, bridged by [`Vault::wait_for_metadata_key`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_yaml::Mapping;
use tokio::sync::Mutex;

use crate::events::{Event, EventBus};

pub mod disk;
pub mod memory;

pub use disk::DiskVault;
pub use memory::MemoryVault;

/// How long a metadata-index wait polls before giving up and proceeding.
pub(crate) const META_WAIT_POLLS: usize = 10;
pub(crate) const META_WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// One node of the host's cached folder tree. A read-only reflection;
/// never the source of truth for identity.
#[derive(Clone, Debug)]
pub struct TreeNode {
    pub path: String,
    pub is_folder: bool,
    pub children: Vec<TreeNode>,
}

#[async_trait]
pub trait Vault: Send + Sync {
    /// Full document content. Missing files are an error.
    async fn read(&self, path: &str) -> Result<String>;

    /// Write full document content, creating the file if needed.
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    async fn create_folder(&self, path: &str) -> Result<()>;

    /// Rename/move a file. The destination folder must exist.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> bool;

    /// All markdown documents in the vault, sorted.
    async fn list_files(&self) -> Result<Vec<String>>;

    /// Frontmatter for a path as last indexed by the host. May lag writes.
    fn cached_metadata(&self, path: &str) -> Option<Mapping>;

    /// Block until the metadata index for `path` agrees with the stored
    /// content for `key`, or until the retry budget runs out. Bounded and
    /// non-failing: forward progress wins over strict consistency.
    async fn wait_for_metadata_key(&self, path: &str, key: &str);

    /// The host's cached subtree rooted at `folder`, when one is available.
    fn cached_tree(&self, folder: &str) -> Option<TreeNode>;

    fn events(&self) -> &EventBus;

    /// Fire-and-forget user notification.
    fn notify(&self, message: &str) {
        self.events().send(Event::Notice {
            message: message.to_string(),
        });
    }
}

/// Async mutexes keyed by vault path, shared across every record wrapper
/// for that path. Guards read-modify-write of one document's header.
#[derive(Default)]
pub struct PathLocks {
    inner: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for a path, created on first use.
    pub fn lock_for(&self, path: &str) -> Arc<Mutex<()>> {
        self.inner
            .lock()
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Re-key a lock after a rename so later writers contend on the new path.
    pub fn rekey(&self, from: &str, to: &str) {
        let mut map = self.inner.lock();
        if let Some(lock) = map.remove(from) {
            map.insert(to.to_string(), lock);
        }
    }
}
