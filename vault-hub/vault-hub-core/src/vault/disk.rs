//! Disk-backed vault rooted at a directory. Keeps a frontmatter index that
//! plays the role of the host's metadata cache: refreshed on writes and
//! renames, scanned once at open.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_yaml::Mapping;
use walkdir::WalkDir;

use super::{TreeNode, Vault, META_WAIT_INTERVAL, META_WAIT_POLLS};
use crate::events::EventBus;
use crate::{frontmatter, paths};

pub struct DiskVault {
    root: PathBuf,
    index: RwLock<HashMap<String, Mapping>>,
    events: EventBus,
}

impl DiskVault {
    /// Open (creating if needed) a vault directory and index its documents.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let mut index = HashMap::new();
        for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative(&root, entry.path()) else {
                continue;
            };
            if paths::extension(&rel) != "md" {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(entry.path()) {
                if let Some(header) = frontmatter::parse(&content).header {
                    index.insert(rel, header);
                }
            }
        }
        Ok(Self {
            root,
            index: RwLock::new(index),
            events: EventBus::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn abs(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn reindex(&self, path: &str, content: &str) {
        let mut index = self.index.write();
        match frontmatter::parse(content).header {
            Some(header) => {
                index.insert(path.to_string(), header);
            }
            None => {
                index.remove(path);
            }
        }
    }

    fn subtree(&self, folder: &str) -> Option<TreeNode> {
        let abs = self.abs(folder);
        if !abs.is_dir() {
            return None;
        }
        let mut children = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(&abs)
            .ok()?
            .filter_map(|e| e.ok())
            .collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let child_path = paths::join(folder, name);
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if let Some(node) = self.subtree(&child_path) {
                    children.push(node);
                }
            } else if file_type.is_file() {
                children.push(TreeNode {
                    path: child_path,
                    is_folder: false,
                    children: Vec::new(),
                });
            }
        }
        Some(TreeNode {
            path: folder.to_string(),
            is_folder: true,
            children,
        })
    }
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for segment in rel.components() {
        let segment = segment.as_os_str().to_str()?;
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    Some(out)
}

#[async_trait]
impl Vault for DiskVault {
    async fn read(&self, path: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.abs(path)).await?)
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let abs = self.abs(path);
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&abs, content).await?;
        self.reindex(path, content);
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.abs(path)).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        tokio::fs::rename(self.abs(from), self.abs(to)).await?;
        let mut index = self.index.write();
        if let Some(meta) = index.remove(from) {
            index.insert(to.to_string(), meta);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.abs(path)).await.unwrap_or(false)
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative(&self.root, entry.path()) else {
                continue;
            };
            if paths::extension(&rel) == "md" {
                files.push(rel);
            }
        }
        files.sort();
        Ok(files)
    }

    fn cached_metadata(&self, path: &str) -> Option<Mapping> {
        self.index.read().get(path).cloned()
    }

    async fn wait_for_metadata_key(&self, path: &str, key: &str) {
        for _ in 0..META_WAIT_POLLS {
            let want = match tokio::fs::read_to_string(self.abs(path)).await {
                Ok(content) => frontmatter::parse(&content)
                    .header
                    .and_then(|m| m.get(key).cloned()),
                Err(_) => None,
            };
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
        self.subtree(folder)
    }

    fn events(&self) -> &EventBus {
        &self.events
    }
}
