//! Merge-patch algorithm shared by every `DocumentStore` implementation.
//!
//! Differs from RFC 7396 so that a model response omitting or nulling fields
//! never destroys previously-known state:
//! - object keys overwrite recursively;
//! - arrays union (existing order kept, new elements appended once);
//! - `null` never deletes and never overwrites; it is only inserted where the
//!   key is absent.

use serde_json::Value;

/// Applies `patch` onto `target` in place.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Null => {
            // Absent keys are handled by the object branch; an existing value wins.
        }
        Value::Object(patch_map) => {
            if let Value::Object(target_map) = target {
                for (key, patch_value) in patch_map {
                    match target_map.get_mut(key) {
                        Some(existing) => merge_patch(existing, patch_value),
                        None => {
                            target_map.insert(key.clone(), patch_value.clone());
                        }
                    }
                }
            } else {
                *target = patch.clone();
            }
        }
        Value::Array(items) => {
            if let Value::Array(existing) = target {
                for item in items {
                    if !existing.contains(item) {
                        existing.push(item.clone());
                    }
                }
            } else {
                *target = patch.clone();
            }
        }
        scalar => *target = scalar.clone(),
    }
}

/// Returns a new document: `base` with `patch` merged in. A missing base
/// starts from an empty object.
#[must_use]
pub fn merged(base: Option<&Value>, patch: &Value) -> Value {
    let mut document = base
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    merge_patch(&mut document, patch);
    document
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_object_keys_overwrite_recursively() {
        let mut doc = json!({"name": "Tom", "stats": {"hp": 10, "mood": "calm"}});

        merge_patch(&mut doc, &json!({"stats": {"hp": 7}}));

        assert_eq!(doc, json!({"name": "Tom", "stats": {"hp": 7, "mood": "calm"}}));
    }

    #[test]
    fn test_arrays_union_instead_of_replace() {
        let mut doc = json!({"knows": ["npc_a", "npc_b"]});

        merge_patch(&mut doc, &json!({"knows": ["npc_b", "npc_c"]}));

        assert_eq!(doc, json!({"knows": ["npc_a", "npc_b", "npc_c"]}));
    }

    #[test]
    fn test_null_does_not_delete_existing_value() {
        let mut doc = json!({"location": "loc_mill"});

        merge_patch(&mut doc, &json!({"location": null}));

        assert_eq!(doc, json!({"location": "loc_mill"}));
    }

    #[test]
    fn test_null_is_inserted_for_absent_key() {
        let mut doc = json!({"name": "Tom"});

        merge_patch(&mut doc, &json!({"title": null}));

        assert_eq!(doc, json!({"name": "Tom", "title": null}));
    }

    #[test]
    fn test_applying_same_patch_twice_is_idempotent() {
        let base = json!({"name": "Tom", "tags": ["miller"], "stats": {"hp": 3}});
        let patch = json!({"tags": ["grumpy", "miller"], "stats": {"hp": 5, "ac": null}, "age": 61});

        let once = merged(Some(&base), &patch);
        let twice = merged(Some(&once), &patch);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_merged_without_base_starts_from_patch() {
        let doc = merged(None, &json!({"name": "Tom"}));

        assert_eq!(doc, json!({"name": "Tom"}));
    }
}
