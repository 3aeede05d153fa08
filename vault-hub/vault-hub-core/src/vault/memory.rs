//! In-memory vault. Useful for tests and dry runs; optionally simulates the
//! host's lagging metadata index so the wait primitive has something to wait
//! for.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_yaml::Mapping;

use super::{TreeNode, Vault, META_WAIT_INTERVAL, META_WAIT_POLLS};
use crate::events::EventBus;
use crate::{frontmatter, paths};

pub struct MemoryVault {
    files: Arc<RwLock<HashMap<String, String>>>,
    folders: Arc<RwLock<HashSet<String>>>,
    index: Arc<RwLock<HashMap<String, Mapping>>>,
    index_delay: Option<Duration>,
    serve_tree: bool,
    events: EventBus,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            folders: Arc::new(RwLock::new(HashSet::new())),
            index: Arc::new(RwLock::new(HashMap::new())),
            index_delay: None,
            serve_tree: true,
            events: EventBus::new(),
        }
    }

    /// Metadata index updates land only after `delay`.
    pub fn with_index_delay(delay: Duration) -> Self {
        Self {
            index_delay: Some(delay),
            ..Self::new()
        }
    }

    /// No cached folder tree; children discovery must fall back to scans.
    pub fn without_tree() -> Self {
        Self {
            serve_tree: false,
            ..Self::new()
        }
    }

    fn index_now(&self, path: &str, content: &str) {
        let parsed = frontmatter::parse(content);
        let mut index = self.index.write();
        match parsed.header {
            Some(map) => {
                index.insert(path.to_string(), map);
            }
            None => {
                index.remove(path);
            }
        }
    }

    fn subtree(&self, folder: &str) -> TreeNode {
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{folder}/")
        };
        let (child_files, subfolders) = {
            let files = self.files.read();
            let folders = self.folders.read();
            let mut child_files: Vec<String> = files
                .keys()
                .filter(|p| p.starts_with(&prefix) && !p[prefix.len()..].contains('/'))
                .cloned()
                .collect();
            child_files.sort();
            let mut subfolders: HashSet<String> = HashSet::new();
            for path in files.keys().chain(folders.iter()) {
                if let Some(rest) = path.strip_prefix(&prefix) {
                    if let Some((first, _)) = rest.split_once('/') {
                        subfolders.insert(paths::join(folder, first));
                    } else if !rest.is_empty() && folders.contains(path) {
                        subfolders.insert(path.clone());
                    }
                }
            }
            let mut subfolders: Vec<String> = subfolders.into_iter().collect();
            subfolders.sort();
            (child_files, subfolders)
        };

        let mut children: Vec<TreeNode> = subfolders
            .iter()
            .map(|sub| self.subtree(sub))
            .collect();
        children.extend(child_files.into_iter().map(|path| TreeNode {
            path,
            is_folder: false,
            children: Vec::new(),
        }));
        TreeNode {
            path: folder.to_string(),
            is_folder: true,
            children,
        }
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Vault for MemoryVault {
    async fn read(&self, path: &str) -> Result<String> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {path}"))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.files
            .write()
            .insert(path.to_string(), content.to_string());
        match self.index_delay {
            None => self.index_now(path, content),
            Some(delay) => {
                let index = Arc::clone(&self.index);
                let path = path.to_string();
                let content = content.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let parsed = frontmatter::parse(&content);
                    let mut index = index.write();
                    match parsed.header {
                        Some(map) => {
                            index.insert(path, map);
                        }
                        None => {
                            index.remove(&path);
                        }
                    }
                });
            }
        }
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        let mut folders = self.folders.write();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = paths::join(&current, segment);
            folders.insert(current.clone());
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let content = {
            let mut files = self.files.write();
            files
                .remove(from)
                .ok_or_else(|| anyhow!("no such file: {from}"))?
        };
        self.files
            .write()
            .insert(to.to_string(), content);
        // The index follows the file; its contents did not change.
        let mut index = self.index.write();
        if let Some(meta) = index.remove(from) {
            index.insert(to.to_string(), meta);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        if self.files.read().contains_key(path) || self.folders.read().contains(path) {
            return true;
        }
        // Folders implied by deeper file paths exist too.
        let prefix = format!("{path}/");
        self.files.read().keys().any(|p| p.starts_with(&prefix))
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let mut files: Vec<String> = self
            .files
            .read()
            .keys()
            .filter(|p| paths::extension(p) == "md")
            .cloned()
            .collect();
        files.sort();
        Ok(files)
    }

    fn cached_metadata(&self, path: &str) -> Option<Mapping> {
        self.index.read().get(path).cloned()
    }

    async fn wait_for_metadata_key(&self, path: &str, key: &str) {
        for _ in 0..META_WAIT_POLLS {
            let want = self
                .files
                .read()
                .get(path)
                .and_then(|c| frontmatter::parse(c).header)
                .and_then(|m| m.get(key).cloned());
            let have = self
                .index
                .read()
                .get(path)
                .and_then(|m| m.get(key).cloned());
            if want == have {
                return;
            }
            tokio::time::sleep(META_WAIT_INTERVAL).await;
        }
        tracing::debug!(path, key, "metadata index did not settle; proceeding");
    }

    fn cached_tree(&self, folder: &str) -> Option<TreeNode> {
        if !self.serve_tree {
            return None;
        }
        let known = self.folders.read().contains(folder);
        let implied = {
            let prefix = format!("{folder}/");
            self.files.read().keys().any(|p| p.starts_with(&prefix))
        };
        if folder.is_empty() || known || implied {
            Some(self.subtree(folder))
        } else {
            None
        }
    }

    fn events(&self) -> &EventBus {
        &self.events
    }
}
