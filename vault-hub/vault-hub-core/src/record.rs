//! `FileRecord`: the document-handling wrapper owning metadata I/O and moves
//! for one stored document.
//!
//! Metadata writes are read-modify-write under a per-path async lock, with
//! structural change suppression so a re-applied value never produces a write
//! (which would otherwise echo back through the host's metadata cache). The
//! `path`/`name`/`basename` view is kept in sync with the last successful
//! move.

use std::sync::Arc;

use anyhow::Result;
use serde_yaml::{Mapping, Value};
use uuid::Uuid;

use crate::events::Event;
use crate::frontmatter;
use crate::paths;
use crate::vault::{PathLocks, TreeNode, Vault};

/// Frontmatter key holding the lazily assigned stable identity.
pub const ID_KEY: &str = "id";

pub struct FileRecord {
    vault: Arc<dyn Vault>,
    locks: Arc<PathLocks>,
    path: String,
}

impl FileRecord {
    pub fn new(vault: Arc<dyn Vault>, locks: Arc<PathLocks>, path: &str) -> Self {
        Self {
            vault,
            locks,
            path: paths::normalize(path),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name with extension.
    pub fn name(&self) -> &str {
        paths::file_name(&self.path)
    }

    pub fn basename(&self) -> &str {
        paths::basename(&self.path)
    }

    pub fn extension(&self) -> &str {
        paths::extension(&self.path)
    }

    /// Containing folder (`""` at the vault root).
    pub fn folder(&self) -> &str {
        paths::parent_folder(&self.path)
    }

    /// A record whose containing folder is named after it is already housed
    /// in its dedicated folder; the folder, not just the file, represents the
    /// entity.
    pub fn in_dedicated_folder(&self) -> bool {
        let folder = self.folder();
        !folder.is_empty() && paths::file_name(folder) == self.basename()
    }

    /// The host's cached subtree for this record's dedicated folder, if the
    /// record is housed in one and the host has a tree to offer.
    pub fn cached_children(&self) -> Option<TreeNode> {
        if !self.in_dedicated_folder() {
            return None;
        }
        self.vault.cached_tree(self.folder())
    }

    /// Current metadata, read fresh from storage. Absent or unparseable
    /// headers read as an empty mapping; this never fails.
    pub async fn get_metadata(&self) -> Mapping {
        match self.vault.read(&self.path).await {
            Ok(content) => frontmatter::parse(&content).header.unwrap_or_default(),
            Err(err) => {
                tracing::debug!(path = %self.path, %err, "metadata read failed");
                Mapping::new()
            }
        }
    }

    /// Set one metadata key. No-ops when the new value deep-equals the
    /// current one; refuses (without corrupting) documents whose header is
    /// absent or malformed. After a real write, waits for the host's
    /// metadata index to observe the key so chained reads see fresh state.
    pub async fn update_metadata(&mut self, key: &str, value: Value) -> Result<()> {
        let lock = self.locks.lock_for(&self.path);
        let _guard = lock.lock().await;

        let content = self.vault.read(&self.path).await?;
        let parsed = frontmatter::parse(&content);
        let Some(mut header) = parsed.header else {
            tracing::warn!(path = %self.path, key, "header absent or malformed; update refused");
            return Ok(());
        };
        if header.get(key) == Some(&value) {
            return Ok(());
        }
        header.insert(Value::String(key.to_string()), value);
        let body = parsed.body.to_string();
        self.vault
            .write(&self.path, &frontmatter::compose(&header, &body))
            .await?;
        self.vault.events().send(Event::MetadataUpdated {
            path: self.path.clone(),
            key: key.to_string(),
        });
        self.vault.wait_for_metadata_key(&self.path, key).await;
        Ok(())
    }

    /// Replace the whole header, preserving the body. Used for initial
    /// creation and key reordering; `extra` is appended to the body (for
    /// fresh documents that should start with some content).
    pub async fn save_frontmatter(&mut self, header: Mapping, extra: Option<&str>) -> Result<()> {
        let lock = self.locks.lock_for(&self.path);
        let _guard = lock.lock().await;

        let existing = self.vault.read(&self.path).await.unwrap_or_default();
        let body = frontmatter::parse(&existing).body.to_string();
        let mut out = frontmatter::compose(&header, &body);
        if let Some(extra) = extra {
            out.push_str(extra);
        }
        self.vault.write(&self.path, &out).await?;
        Ok(())
    }

    /// Move this record into `folder`, optionally renaming it. Skips without
    /// error when the destination is already occupied; creates the folder
    /// when the storage reports it absent.
    pub async fn move_to(&mut self, folder: &str, new_name: Option<&str>) -> Result<()> {
        let target = paths::join(folder, new_name.unwrap_or_else(|| paths::file_name(&self.path)));
        if target == self.path {
            return Ok(());
        }
        let lock = self.locks.lock_for(&self.path);
        let _guard = lock.lock().await;

        if self.vault.exists(&target).await {
            tracing::warn!(from = %self.path, to = %target, "destination occupied; move skipped");
            return Ok(());
        }
        if !folder.is_empty() && !self.vault.exists(folder).await {
            self.vault.create_folder(folder).await?;
            self.vault.events().send(Event::FolderCreated {
                path: folder.to_string(),
            });
        }
        self.vault.rename(&self.path, &target).await?;
        self.vault.events().send(Event::Moved {
            from: self.path.clone(),
            to: target.clone(),
        });
        self.locks.rekey(&self.path, &target);
        self.path = target;
        Ok(())
    }

    /// Stable identity, assigned lazily: reads `id` from metadata and, when
    /// absent, generates and persists a fresh one.
    pub async fn get_id(&mut self) -> Result<String> {
        let meta = self.get_metadata().await;
        if let Some(id) = meta.get(ID_KEY).and_then(Value::as_str) {
            return Ok(id.to_string());
        }
        let id = Uuid::new_v4().to_string();
        let content = self.vault.read(&self.path).await.unwrap_or_default();
        if frontmatter::parse(&content).has_block {
            self.update_metadata(ID_KEY, Value::String(id.clone()))
                .await?;
        } else {
            let mut header = Mapping::new();
            header.insert(
                Value::String(ID_KEY.to_string()),
                Value::String(id.clone()),
            );
            self.save_frontmatter(header, None).await?;
        }
        Ok(id)
    }
}
