//! PropertyMap — the key-value bag on every note.
//!
//! Nested frontmatter is stored flat with dotted keys ("project.status"),
//! so dotted property paths and literal dot-containing keys resolve through
//! the same lookup.

use super::Value;

/// A map of property names to values.
pub type PropertyMap = hashbrown::HashMap<String, Value>;

/// Flatten a JSON object into a PropertyMap, joining nested object keys
/// with dots. When a literal dot-containing key collides with a key
/// produced by nested expansion, the nested value wins. Non-object input
/// yields an empty map.
pub fn property_map_from_json(json: serde_json::Value) -> PropertyMap {
    let mut map = PropertyMap::new();
    if let serde_json::Value::Object(obj) = json {
        flatten_object(&mut map, None, obj);
    }
    map
}

// Nested objects expand before sibling scalars at every level, and a
// flattened key never overwrites one that is already present.
fn flatten_object(
    map: &mut PropertyMap,
    prefix: Option<&str>,
    obj: serde_json::Map<String, serde_json::Value>,
) {
    let (nested, leaves): (Vec<_>, Vec<_>) =
        obj.into_iter().partition(|(_, val)| val.is_object());
    for (key, val) in nested.into_iter().chain(leaves) {
        let full = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key,
        };
        match val {
            serde_json::Value::Object(inner) => flatten_object(map, Some(&full), inner),
            other => {
                map.entry(full).or_insert_with(|| Value::from(other));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flattens_nested_objects() {
        let map = property_map_from_json(serde_json::json!({
            "title": "Note",
            "project": { "status": "active", "meta": { "owner": "ada" } },
        }));

        assert_eq!(map.get("title"), Some(&Value::String("Note".into())));
        assert_eq!(map.get("project.status"), Some(&Value::String("active".into())));
        assert_eq!(map.get("project.meta.owner"), Some(&Value::String("ada".into())));
    }

    #[test]
    fn test_nested_value_wins_over_literal_dotted_key() {
        let map = property_map_from_json(serde_json::json!({
            "a.b": 9,
            "a": { "b": 2 },
        }));

        assert_eq!(map.get("a.b"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_non_object_is_empty() {
        assert!(property_map_from_json(serde_json::json!([1, 2])).is_empty());
    }
}
