//! Children discovery strategies.
//!
//! The cached folder tree is a cheap reflection of the authoritative answer
//! (the metadata scan); when it is unavailable or empty the scan is the
//! ground truth. Both must agree whenever the tree is populated.

use anyhow::Result;
use async_trait::async_trait;

use super::Entity;
use crate::paths;
use crate::vault::TreeNode;

#[async_trait]
pub trait ChildFinder: Send + Sync {
    async fn find(&self, entity: &Entity) -> Result<Vec<Entity>>;
}

/// Walks the host's cached folder tree under the entity's dedicated folder:
/// direct files are children, subfolders are descended into and their files
/// collected, in traversal order. No metadata reads.
pub struct TreeCacheFinder;

#[async_trait]
impl ChildFinder for TreeCacheFinder {
    async fn find(&self, entity: &Entity) -> Result<Vec<Entity>> {
        let Some(record) = entity.record() else {
            return Ok(Vec::new());
        };
        let Some(tree) = record.cached_children() else {
            return Ok(Vec::new());
        };
        let own_path = record.path().to_string();
        let mut files = Vec::new();
        collect_files(&tree, &own_path, &mut files);
        let mut out = Vec::with_capacity(files.len());
        for path in files {
            out.push(entity.engine().entity_at(&path).await);
        }
        Ok(out)
    }
}

fn collect_files(node: &TreeNode, own_path: &str, out: &mut Vec<String>) {
    for child in &node.children {
        if child.is_folder {
            collect_files(child, own_path, out);
        } else if child.path != own_path && paths::extension(&child.path) == "md" {
            out.push(child.path.clone());
        }
    }
}

/// Enumerates every document in the store and keeps those whose resolved
/// parent reference points back at the entity. O(total documents); used when
/// no cached tree is available.
pub struct FullScanFinder;

#[async_trait]
impl ChildFinder for FullScanFinder {
    async fn find(&self, entity: &Entity) -> Result<Vec<Entity>> {
        let Some(record) = entity.record() else {
            return Ok(Vec::new());
        };
        let own_path = record.path().to_string();
        let own_name = record.basename().to_string();
        let mut out = Vec::new();
        for path in entity.engine().vault().list_files().await? {
            if path == own_path {
                continue;
            }
            let candidate = entity.engine().entity_at(&path).await;
            if candidate.parent_target().await.as_deref() == Some(own_name.as_str()) {
                out.push(candidate);
            }
        }
        Ok(out)
    }
}
