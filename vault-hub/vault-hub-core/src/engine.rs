//! Engine context: one vault, one type registry, one lock table. Everything
//! that materializes entities or resolves types goes through an instance of
//! this, never through globals.

use std::sync::Arc;

use anyhow::Result;
use serde_yaml::Mapping;

use crate::entity::Entity;
use crate::frontmatter;
use crate::record::FileRecord;
use crate::registry::{EntityType, TypeRegistry};
use crate::vault::{PathLocks, Vault};

#[derive(Clone)]
pub struct Engine {
    vault: Arc<dyn Vault>,
    registry: Arc<TypeRegistry>,
    locks: Arc<PathLocks>,
}

impl Engine {
    pub fn new(vault: Arc<dyn Vault>, registry: TypeRegistry) -> Self {
        Self {
            vault,
            registry: Arc::new(registry),
            locks: Arc::new(PathLocks::new()),
        }
    }

    pub fn vault(&self) -> &Arc<dyn Vault> {
        &self.vault
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// A record wrapper for a vault path, sharing this engine's lock table.
    pub fn record(&self, path: &str) -> FileRecord {
        FileRecord::new(Arc::clone(&self.vault), Arc::clone(&self.locks), path)
    }

    /// A fresh entity of the given type with no file attached yet; callers
    /// hand it a record via [`Entity::set_record`].
    pub fn entity(&self, kind: Arc<EntityType>) -> Entity {
        Entity::new(self.clone(), kind)
    }

    /// Materialize the entity stored at `path`, resolving its type from the
    /// metadata index (falling back to a fresh read when the index has
    /// nothing). Materialization is silent: it never triggers
    /// reconciliation.
    pub async fn entity_at(&self, path: &str) -> Entity {
        let meta = match self.vault.cached_metadata(path) {
            Some(meta) => meta,
            None => self.fresh_metadata(path).await,
        };
        let kind = self.registry.resolve(&meta);
        let mut entity = Entity::new(self.clone(), kind);
        entity.attach_record(self.record(path));
        entity
    }

    async fn fresh_metadata(&self, path: &str) -> Mapping {
        match self.vault.read(path).await {
            Ok(content) => frontmatter::parse(&content).header.unwrap_or_default(),
            Err(_) => Mapping::new(),
        }
    }

    /// Run reconciliation for every typed entity that declares a parent
    /// reference. Returns how many entities were visited. Per-entity
    /// failures are logged and do not stop the pass.
    pub async fn reconcile_all(&self) -> Result<usize> {
        let mut visited = 0;
        for path in self.vault.list_files().await? {
            // Earlier entities in the pass may have moved this one already.
            if !self.vault.exists(&path).await {
                continue;
            }
            let mut entity = self.entity_at(&path).await;
            if entity.kind().parent_property.is_none() {
                continue;
            }
            visited += 1;
            if let Err(err) = entity.update_parent_folder().await {
                tracing::warn!(path = %path, %err, "reconciliation failed");
                self.vault
                    .notify(&format!("could not reorganize {path}: {err}"));
            }
        }
        Ok(visited)
    }
}
