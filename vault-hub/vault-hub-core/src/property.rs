//! Property kinds and cross-reference link handling.
//!
//! Only the file-reference family of kinds can act as a parent edge; a text
//! property holding the same `[[bracketed]]` syntax is a leaf reference with
//! no structural effect. That distinction lives in [`PropertyKind::resolves_to_entity`]
//! rather than in string comparisons on kind names.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// The declared kind of a named property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropertyKind {
    Text,
    Number,
    Date,
    Select,
    File,
    MultiFile,
    Object,
    Media,
    Formula,
}

impl PropertyKind {
    /// Whether values of this kind name another entity when present.
    pub fn resolves_to_entity(self) -> bool {
        matches!(self, Self::File | Self::MultiFile | Self::Object)
    }
}

/// Extract the target name from a `[[Name]]` reference.
///
/// `[[Name|alias]]` and `[[Name#heading]]` resolve to `Name`.
pub fn parse_link(raw: &str) -> Option<&str> {
    let inner = raw.trim().strip_prefix("[[")?.strip_suffix("]]")?;
    let inner = inner.split(['|', '#']).next().unwrap_or(inner).trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// Render a reference to the named entity.
pub fn format_link(name: &str) -> String {
    format!("[[{name}]]")
}

/// Resolve the entity name a property value points at, honoring the kind.
///
/// - `File`: the value itself is a link.
/// - `MultiFile`: the first link in the list.
/// - `Object`: the first link-shaped string among the mapping's values.
/// - anything else: never a parent edge.
pub fn link_target(value: &Value, kind: PropertyKind) -> Option<String> {
    if !kind.resolves_to_entity() {
        return None;
    }
    match kind {
        PropertyKind::File => value.as_str().and_then(parse_link).map(str::to_string),
        PropertyKind::MultiFile => value
            .as_sequence()?
            .iter()
            .find_map(|item| item.as_str().and_then(parse_link))
            .map(str::to_string),
        PropertyKind::Object => value
            .as_mapping()?
            .values()
            .find_map(|item| item.as_str().and_then(parse_link))
            .map(str::to_string),
        _ => None,
    }
}
