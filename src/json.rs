//! Recursive merge and diff over JSON objects.
//!
//! These two operations drive installation property synchronization: local
//! writes are merged into the desired state, and the flush computes a diff
//! between the last server-acknowledged state and the desired state. In both
//! directions a JSON `null` is a deletion marker, not a value.

use serde_json::{Map, Value};

/// Merges `delta` into `base`, recursively.
///
/// A `null` entry in `delta` removes the key from `base`. When both sides
/// hold an object under the same key the objects are merged recursively;
/// any other pair of values is resolved by cloning the `delta` side.
pub fn merge_into(base: &mut Map<String, Value>, delta: &Map<String, Value>) {
    for (key, incoming) in delta {
        if incoming.is_null() {
            base.remove(key);
            continue;
        }
        match (base.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_into(existing, nested);
            }
            _ => {
                base.insert(key.clone(), incoming.clone());
            }
        }
    }
}

/// Computes the delta that transforms `base` into `target`.
///
/// Keys present in `base` but absent from `target` appear in the result as
/// explicit `null` entries so the server deletes them. Keys whose values are
/// equal on both sides are omitted. When both sides hold objects the diff
/// recurses; otherwise the `target` value is taken wholesale.
pub fn diff(base: &Map<String, Value>, target: &Map<String, Value>) -> Map<String, Value> {
    let mut delta = Map::new();
    for (key, old) in base {
        match target.get(key) {
            None => {
                delta.insert(key.clone(), Value::Null);
            }
            Some(new) if new == old => {}
            Some(Value::Object(new)) => {
                if let Value::Object(old) = old {
                    delta.insert(key.clone(), Value::Object(diff(old, new)));
                } else {
                    delta.insert(key.clone(), Value::Object(new.clone()));
                }
            }
            Some(new) => {
                delta.insert(key.clone(), new.clone());
            }
        }
    }
    for (key, new) in target {
        if !base.contains_key(key) {
            delta.insert(key.clone(), new.clone());
        }
    }
    delta
}
