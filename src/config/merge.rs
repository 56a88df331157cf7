//! Layering of configuration files
//!
//! Built-in defaults, the base file and CLI flags are layered silently:
//! - Objects: deep-merge by key
//! - Arrays: replaced (a file's `data_sources` list replaces the default list)
//! - Scalars: last wins
//!
//! Data-source overrides do not go through here; they use the
//! conflict-reporting merge of the namespace crate.

use serde_json::Value;

/// Layer `overlay` on top of `base`
pub fn layer(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => layer(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        // An empty document does not erase lower layers
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Layer values in order (first is lowest precedence)
pub fn layer_all(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, layer)
}
