//! Folder organization for typed entities stored as markdown documents with
//! frontmatter metadata. The engine keeps the physical folder layout of a
//! vault consistent with the logical parent chain declared in each
//! document's header.

pub mod engine;
pub mod entity;
pub mod events;
pub mod frontmatter;
pub mod paths;
pub mod property;
pub mod record;
pub mod registry;
pub mod vault;

pub use engine::Engine;
pub use entity::Entity;
pub use record::FileRecord;
pub use registry::{EntityType, TypeRegistry};
pub use vault::{DiskVault, MemoryVault, Vault};
