//! Layered JSON configuration loading.
//!
//! Scoped to in-memory/JSON layers: reading files from disk, environment
//! variables, and database-backed config (§6 ConfigLoader's `database`
//! section) are external collaborator concerns and stay out of this crate.
//! What stays is the part this engine's determinism invariants actually
//! depend on: deterministic deep-merge of override layers plus a stable
//! canonical-JSON hash so two runs built from the same layers are provably
//! the same run.

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Result of merging and canonicalizing a sequence of JSON layers.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Deep-merge a sequence of JSON layers in order; later layers override
/// earlier ones. Objects merge recursively; arrays and scalars are replaced
/// wholesale by the later layer.
pub fn load_layered_json(layers: &[Value]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for layer in layers {
        deep_merge(&mut merged, layer.clone());
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_layer_overrides_earlier_scalar() {
        let base = json!({"a": 1, "b": {"c": 2}});
        let over = json!({"b": {"c": 3}});
        let loaded = load_layered_json(&[base, over]).unwrap();
        assert_eq!(loaded.config_json["b"]["c"], 3);
        assert_eq!(loaded.config_json["a"], 1);
    }

    #[test]
    fn hash_is_stable_regardless_of_input_key_order() {
        let a = json!({"z": 1, "a": 2});
        let b = json!({"a": 2, "z": 1});
        let la = load_layered_json(&[a]).unwrap();
        let lb = load_layered_json(&[b]).unwrap();
        assert_eq!(la.config_hash, lb.config_hash);
    }

    #[test]
    fn array_values_are_replaced_not_merged() {
        let base = json!({"xs": [1, 2, 3]});
        let over = json!({"xs": [4]});
        let loaded = load_layered_json(&[base, over]).unwrap();
        assert_eq!(loaded.config_json["xs"], json!([4]));
    }
}
