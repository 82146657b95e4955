//! Reference collection over JSON documents.

use std::collections::{BTreeMap, BTreeSet};

use lorekeeper_core::ids::{EntityId, EntityType};
use serde::Serialize;
use serde_json::Value;

/// A referenced id with no backing document of its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DanglingReference {
    /// The unresolved id.
    pub id: EntityId,
    /// The type its prefix implies.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Where it appears, as `<document id>/<JSON path>`, sorted.
    pub locations: Vec<String>,
    /// A name found next to the reference (`{"id": ..., "name": ...}`), if any.
    pub name_hint: Option<String>,
}

#[derive(Debug, Clone)]
struct Referenced {
    entity_type: EntityType,
    locations: BTreeSet<String>,
    name_hint: Option<String>,
}

/// Every typed reference seen across a set of documents.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    references: BTreeMap<EntityId, Referenced>,
}

impl ReferenceIndex {
    /// Adds the references found in one document. A document's reference to
    /// its own id is not recorded.
    pub fn collect(&mut self, doc_id: &str, document: &Value) {
        let mut path = String::from("$");
        self.walk(doc_id, document, &mut path, None);
    }

    fn walk(&mut self, doc_id: &str, value: &Value, path: &mut String, sibling_name: Option<&str>) {
        match value {
            Value::String(text) => {
                let Some(entity_type) = EntityType::of_reference(text) else {
                    return;
                };
                if text == doc_id {
                    return;
                }
                let entry = self
                    .references
                    .entry(EntityId::new(text.as_str()))
                    .or_insert_with(|| Referenced {
                        entity_type,
                        locations: BTreeSet::new(),
                        name_hint: None,
                    });
                entry.locations.insert(format!("{doc_id}/{path}"));
                if entry.name_hint.is_none() {
                    entry.name_hint = sibling_name.map(str::to_owned);
                }
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!("[{index}]"));
                    self.walk(doc_id, item, path, None);
                    path.truncate(len);
                }
            }
            Value::Object(object) => {
                let name = object
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|name| !name.trim().is_empty());
                for (key, child) in object {
                    let len = path.len();
                    path.push('.');
                    path.push_str(key);
                    let hint = if key == "id" { name } else { None };
                    self.walk(doc_id, child, path, hint);
                    path.truncate(len);
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }

    /// Number of distinct referenced ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.references.len()
    }

    /// Whether no reference was seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// References for which `exists` is false, ordered by id.
    #[must_use]
    pub fn dangling(&self, exists: impl Fn(&EntityId) -> bool) -> Vec<DanglingReference> {
        self.references
            .iter()
            .filter(|(id, _)| !exists(id))
            .map(|(id, referenced)| DanglingReference {
                id: id.clone(),
                entity_type: referenced.entity_type,
                locations: referenced.locations.iter().cloned().collect(),
                name_hint: referenced.name_hint.clone(),
            })
            .collect()
    }
}

/// Builds an index over `documents`.
#[must_use]
pub fn collect_references<'a>(
    documents: impl IntoIterator<Item = (&'a str, &'a Value)>,
) -> ReferenceIndex {
    let mut index = ReferenceIndex::default();
    for (doc_id, document) in documents {
        index.collect(doc_id, document);
    }
    index
}
