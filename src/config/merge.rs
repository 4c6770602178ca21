//! Deep merge of generic configuration documents.
//!
//! Mappings merge key by key; every other value (scalars, sequences, null)
//! in the overlay replaces the base value wholesale.

use serde_json::Value;

/// Merge `overlay` into `base`, the overlay taking precedence.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_maps_merge() {
        let mut base = json!({"server": {"address": "a:1", "tls": {"enabled": true}}});
        deep_merge(&mut base, json!({"server": {"address": "b:2"}}));
        assert_eq!(base, json!({"server": {"address": "b:2", "tls": {"enabled": true}}}));
    }

    #[test]
    fn test_sequences_replace() {
        let mut base = json!({"project": {"ignore": ["a", "b"]}});
        deep_merge(&mut base, json!({"project": {"ignore": ["c"]}}));
        assert_eq!(base, json!({"project": {"ignore": ["c"]}}));
    }

    #[test]
    fn test_scalar_replaces_map() {
        let mut base = json!({"log": {"enabled": true}});
        deep_merge(&mut base, json!({"log": null}));
        assert_eq!(base, json!({"log": null}));
    }
}
