//! Hashing utilities for cache keys

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;

/// Hash a JSON value into a cache key component.
///
/// Object members are folded in sorted key order, so two parameter maps
/// with the same content hash the same no matter how the caller ordered
/// them. Array order stays significant.
pub fn hash_json(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    fold_value(&mut hasher, value);
    hasher.finish()
}

// Each variant folds a tag alongside its content so e.g. the string "1"
// and the number 1 cannot collide structurally.
fn fold_value<H: Hasher>(hasher: &mut H, value: &Value) {
    match value {
        Value::Null => "null".hash(hasher),
        Value::Bool(b) => ("bool", b).hash(hasher),
        // Numbers go through their display form, which is stable across
        // the i64/u64/f64 representations serde_json may pick
        Value::Number(n) => ("num", n.to_string()).hash(hasher),
        Value::String(s) => ("str", s).hash(hasher),
        Value::Array(items) => {
            ("arr", items.len()).hash(hasher);
            for item in items {
                fold_value(hasher, item);
            }
        }
        Value::Object(members) => {
            ("obj", members.len()).hash(hasher);
            let mut sorted: Vec<(&String, &Value)> = members.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            for (key, member) in sorted {
                key.hash(hasher);
                fold_value(hasher, member);
            }
        }
    }
}
