//! Typed entities and hierarchy reconciliation.
//!
//! An entity wraps one [`FileRecord`] plus its type's declared properties.
//! [`Entity::update_property_value`] is the single authorized write path for
//! metadata; when the written property is the type's parent reference, the
//! folder layout is reconciled so the entity and its whole subtree end up
//! under the parent's dedicated folder.
//!
//! Reconciliation is a recomputation, not a state machine: placement depends
//! only on "do I have children", so settling any node whose parent link
//! changed (parent first, then the node, then its children) re-settles the
//! subtree.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use futures::future::BoxFuture;
use serde_yaml::Value;

use crate::engine::Engine;
use crate::paths;
use crate::property;
use crate::record::FileRecord;
use crate::registry::EntityType;

mod children;
#[cfg(test)]
mod tests;

pub use children::{ChildFinder, FullScanFinder, TreeCacheFinder};

pub struct Entity {
    engine: Engine,
    kind: Arc<EntityType>,
    record: Option<FileRecord>,
}

impl Entity {
    pub(crate) fn new(engine: Engine, kind: Arc<EntityType>) -> Self {
        Self {
            engine,
            kind,
            record: None,
        }
    }

    pub fn kind(&self) -> &EntityType {
        &self.kind
    }

    pub fn record(&self) -> Option<&FileRecord> {
        self.record.as_ref()
    }

    pub fn path(&self) -> Option<&str> {
        self.record.as_ref().map(FileRecord::path)
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Attach a record without any structural side effects (used when
    /// materializing entities that already live where they live).
    pub(crate) fn attach_record(&mut self, record: FileRecord) {
        self.record = Some(record);
    }

    /// Attach (or replace) this entity's backing record. When the type
    /// declares a parent reference, the hierarchy is reconciled once, same
    /// as a parent-property write.
    pub async fn set_record(&mut self, record: FileRecord) {
        self.record = Some(record);
        if self.kind.parent_property.is_some() {
            self.reconcile_and_recover().await;
        }
    }

    /// Write one property value through the record. This is the only
    /// sanctioned metadata write path. Reconciles the folder layout iff
    /// `name` is the type's configured parent reference. Engine-internal
    /// failures are recovered here: logged, reported on the notification
    /// bus, never surfaced to the caller.
    pub async fn update_property_value(&mut self, name: &str, value: Value) {
        let Some(record) = self.record.as_mut() else {
            tracing::warn!(property = name, "no file attached; property write dropped");
            return;
        };
        if let Err(err) = record.update_metadata(name, value).await {
            tracing::warn!(path = %record.path(), property = name, %err, "metadata write failed");
            self.engine
                .vault()
                .notify(&format!("could not update {name}: {err}"));
            return;
        }
        if self.kind.parent_property.as_deref() == Some(name) {
            self.reconcile_and_recover().await;
        }
    }

    async fn reconcile_and_recover(&mut self) {
        if let Err(err) = self.update_parent_folder().await {
            let path = self.path().unwrap_or_default().to_string();
            tracing::warn!(path = %path, %err, "reconciliation failed");
            self.engine
                .vault()
                .notify(&format!("could not reorganize {path}: {err}"));
        }
    }

    /// The name this entity's parent reference points at, if the reference
    /// exists, is of the file-reference family, and holds a link.
    pub async fn parent_target(&self) -> Option<String> {
        let prop = self.kind.parent_property.as_deref()?;
        let kind = self.kind.parent_kind()?;
        if !kind.resolves_to_entity() {
            return None;
        }
        let record = self.record.as_ref()?;
        let meta = record.get_metadata().await;
        property::link_target(meta.get(prop)?, kind)
    }

    /// Resolve the parent entity by name. Broken or missing links resolve to
    /// `None`; they are not errors.
    pub async fn resolve_parent(&self) -> Option<Entity> {
        let target = self.parent_target().await?;
        let own_path = self.path()?;
        let files = self.engine.vault().list_files().await.ok()?;
        let parent_path = files
            .into_iter()
            .find(|path| path != own_path && paths::basename(path) == target)?;
        Some(self.engine.entity_at(&parent_path).await)
    }

    /// Entities whose parent reference points back at this one. Tries the
    /// host's cached folder tree first; falls back to a full metadata scan
    /// when the tree has nothing to offer.
    pub async fn find_children(&self) -> Result<Vec<Entity>> {
        let from_tree = TreeCacheFinder.find(self).await?;
        if !from_tree.is_empty() {
            return Ok(from_tree);
        }
        FullScanFinder.find(self).await
    }

    /// Recompute and apply the correct folder location for this entity and
    /// its subtree. Idempotent: with no intervening metadata change a second
    /// call performs zero moves. A parent chain that loops back on itself is
    /// detected and reported as an error.
    pub async fn update_parent_folder(&mut self) -> Result<()> {
        let mut visited = HashSet::new();
        self.reconcile(&mut visited).await
    }

    fn reconcile<'a>(
        &'a mut self,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.kind.parent_property.is_none() {
                return Ok(());
            }
            let id = match self.record.as_mut() {
                Some(record) => record.get_id().await?,
                None => return Ok(()),
            };
            if !visited.insert(id) {
                bail!(
                    "parent chain loops back through {}",
                    self.path().unwrap_or_default()
                );
            }

            let Some(mut parent) = self.resolve_parent().await else {
                return Ok(());
            };

            // Parent always settles before the child's placement is
            // computed.
            let parent_folder = parent.settle_into_dedicated_folder().await?;

            // Children are discovered before this entity moves; their own
            // reconciliation below recomputes everything from the new
            // layout.
            let children = self.find_children().await?;

            let vault = Arc::clone(self.engine.vault());
            let mut base = parent_folder;
            if let Some(sub) = self.kind.parent_folder_name.as_deref() {
                base = paths::join(&base, sub);
                if !vault.exists(&base).await {
                    vault.create_folder(&base).await?;
                }
            }

            let Some(record) = self.record.as_mut() else {
                return Ok(());
            };
            let target_folder = if children.is_empty() {
                base
            } else {
                // A branch entity gets its own dedicated folder so its
                // children have somewhere to land.
                paths::join(&base, record.basename())
            };
            let target_path = paths::join(&target_folder, record.name());
            if record.path() != target_path {
                record.move_to(&target_folder, None).await?;
            }

            for mut child in children {
                child.reconcile(visited).await?;
            }
            Ok(())
        })
    }

    /// Ensure this entity's file lives inside a folder named after it,
    /// creating the folder next to the file when missing. Returns the
    /// dedicated folder path.
    async fn settle_into_dedicated_folder(&mut self) -> Result<String> {
        let record = match self.record.as_mut() {
            Some(record) => record,
            None => bail!("entity has no file attached"),
        };
        if record.in_dedicated_folder() {
            return Ok(record.folder().to_string());
        }
        let folder = paths::join(record.folder(), record.basename());
        record.move_to(&folder, None).await?;
        Ok(folder)
    }
}
