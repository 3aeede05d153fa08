//! Per-type hierarchy configuration and the explicit type registry.
//!
//! The registry is scoped to one engine instance; there are no process-wide
//! type tables.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::property::PropertyKind;

/// Frontmatter key naming an entity's type.
pub const TYPE_KEY: &str = "type";

/// Static per-type configuration: which property (if any) is the parent
/// reference, and an optional dedicated subfolder used under a parent.
#[derive(Clone, Debug, Deserialize)]
pub struct EntityType {
    pub name: String,
    #[serde(default)]
    pub parent_property: Option<String>,
    #[serde(default)]
    pub parent_folder_name: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyKind>,
}

impl EntityType {
    /// The untyped fallback: no properties, structurally inert.
    pub fn untyped() -> Self {
        Self {
            name: String::new(),
            parent_property: None,
            parent_folder_name: None,
            properties: HashMap::new(),
        }
    }

    pub fn property_kind(&self, name: &str) -> Option<PropertyKind> {
        self.properties.get(name).copied()
    }

    /// Kind of the configured parent property. A parent property left out of
    /// the property table defaults to a singular file reference; one declared
    /// with a non-reference kind yields no parent edge at all.
    pub fn parent_kind(&self) -> Option<PropertyKind> {
        let prop = self.parent_property.as_deref()?;
        Some(self.property_kind(prop).unwrap_or(PropertyKind::File))
    }
}

pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<EntityType>>>,
    untyped: Arc<EntityType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
            untyped: Arc::new(EntityType::untyped()),
        }
    }

    pub fn register(&self, kind: EntityType) {
        self.types
            .write()
            .insert(kind.name.clone(), Arc::new(kind));
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntityType>> {
        self.types.read().get(name).cloned()
    }

    /// Type names currently registered, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a document's type from its metadata; unknown or missing types
    /// come back untyped.
    pub fn resolve(&self, meta: &Mapping) -> Arc<EntityType> {
        meta.get(TYPE_KEY)
            .and_then(Value::as_str)
            .and_then(|name| self.get(name))
            .unwrap_or_else(|| Arc::clone(&self.untyped))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
