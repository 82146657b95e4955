//! Owner and entity identifiers, and the id-prefix conventions that make
//! string values inside documents recognizable as typed cross-references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The player/session identifier that partitions all state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wraps a raw owner identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The kinds of world entity that can be referenced across documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A non-player character.
    Npc,
    /// A place in the world.
    #[serde(alias = "loc")]
    Location,
    /// A quest or objective.
    Quest,
    /// An object that can be carried or used.
    Item,
    /// An organization or group.
    Faction,
}

impl EntityType {
    /// Every known entity type, in prefix-matching order.
    pub const ALL: [EntityType; 5] = [
        EntityType::Npc,
        EntityType::Location,
        EntityType::Quest,
        EntityType::Item,
        EntityType::Faction,
    ];

    /// The id prefix that marks a string as a reference to this type.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            EntityType::Npc => "npc_",
            EntityType::Location => "loc_",
            EntityType::Quest => "quest_",
            EntityType::Item => "item_",
            EntityType::Faction => "faction_",
        }
    }

    /// The canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Npc => "npc",
            EntityType::Location => "location",
            EntityType::Quest => "quest",
            EntityType::Item => "item",
            EntityType::Faction => "faction",
        }
    }

    /// Parses a type name as written by the model (case-insensitive, `loc`
    /// accepted for `location`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "npc" | "character" => Some(EntityType::Npc),
            "location" | "loc" => Some(EntityType::Location),
            "quest" => Some(EntityType::Quest),
            "item" => Some(EntityType::Item),
            "faction" => Some(EntityType::Faction),
            _ => None,
        }
    }

    /// Classifies `value` as a reference if it follows an id-prefix
    /// convention: a known prefix followed by a non-empty slug of ASCII
    /// alphanumerics, `_` or `-`.
    #[must_use]
    pub fn of_reference(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| {
            value.strip_prefix(kind.prefix()).is_some_and(|slug| {
                !slug.is_empty()
                    && slug
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            })
        })
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a world entity document, e.g. `npc_old_tom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wraps a raw entity identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an id for `name` under the prefix convention of `kind`,
    /// e.g. `("Old Tom", Npc)` becomes `npc_old_tom`.
    #[must_use]
    pub fn from_name(kind: EntityType, name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('_') && !slug.is_empty() {
                slug.push('_');
            }
        }
        let slug = slug.trim_end_matches('_');
        let slug = if slug.is_empty() { "unnamed" } else { slug };
        Self(format!("{}{slug}", kind.prefix()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The entity type implied by the id prefix, if any.
    #[must_use]
    pub fn entity_type(&self) -> Option<EntityType> {
        EntityType::of_reference(&self.0)
    }

    /// Turns the slug back into a display name: `npc_old_tom` -> `Old Tom`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let slug = self
            .entity_type()
            .and_then(|kind| self.0.strip_prefix(kind.prefix()))
            .unwrap_or(&self.0);
        slug.split(['_', '-'])
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_ascii_uppercase().to_string() + chars.as_str()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_of_reference_recognizes_each_prefix() {
        assert_eq!(EntityType::of_reference("npc_old_tom"), Some(EntityType::Npc));
        assert_eq!(EntityType::of_reference("loc_mill"), Some(EntityType::Location));
        assert_eq!(EntityType::of_reference("quest_1"), Some(EntityType::Quest));
        assert_eq!(EntityType::of_reference("item_rusty-key"), Some(EntityType::Item));
        assert_eq!(EntityType::of_reference("faction_guild"), Some(EntityType::Faction));
    }

    #[test]
    fn test_of_reference_rejects_prose_and_bare_prefixes() {
        assert_eq!(EntityType::of_reference("npc_"), None);
        assert_eq!(EntityType::of_reference("npc_old tom"), None);
        assert_eq!(EntityType::of_reference("the npc_old_tom"), None);
        assert_eq!(EntityType::of_reference("stats:npc_old_tom"), None);
    }

    #[test]
    fn test_from_name_builds_prefixed_slug() {
        assert_eq!(
            EntityId::from_name(EntityType::Npc, "  Old Tom, the Miller ").as_str(),
            "npc_old_tom_the_miller"
        );
        assert_eq!(EntityId::from_name(EntityType::Item, "!!").as_str(), "item_unnamed");
    }

    #[test]
    fn test_display_name_humanizes_slug() {
        assert_eq!(EntityId::new("npc_old_tom").display_name(), "Old Tom");
        assert_eq!(EntityId::new("loc_black-mill").display_name(), "Black Mill");
    }

    #[test]
    fn test_entity_type_parses_model_spellings() {
        assert_eq!(EntityType::parse("NPC"), Some(EntityType::Npc));
        assert_eq!(EntityType::parse("loc"), Some(EntityType::Location));
        assert_eq!(EntityType::parse("dragon"), None);
    }
}
