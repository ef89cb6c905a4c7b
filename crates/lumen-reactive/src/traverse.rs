#![forbid(unsafe_code)]

//! Deep traversal for `deep` watchers.
//!
//! Recursively touches every reachable property through the tracked
//! accessors so nested deps register on the collecting watcher even though
//! only the top-level read was "seen". Containers are deduplicated by
//! their observer's dep id so shared or cyclic structures terminate.

use ahash::AHashSet;

use crate::observer::observer_of;
use crate::value::Value;

pub fn traverse(value: &Value) {
    let mut seen = AHashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut AHashSet<u64>) {
    match value {
        Value::Array(arr) => {
            if let Some(ob) = observer_of(value)
                && !seen.insert(ob.dep().id())
            {
                return;
            }
            for item in arr.to_vec() {
                traverse_inner(&item, seen);
            }
        }
        Value::Object(obj) => {
            if let Some(ob) = observer_of(value)
                && !seen.insert(ob.dep().id())
            {
                return;
            }
            for key in obj.keys() {
                // Tracked read registers the field dep.
                let child = obj.get(&key);
                traverse_inner(&child, seen);
            }
        }
        Value::Ref(cell) => {
            traverse_inner(&cell.get(), seen);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn cyclic_structures_terminate() {
        let a = Value::object([("x", Value::Int(1))]);
        crate::observer::observe(&a).unwrap();
        crate::observer::set_key(&a, "self", a.clone());
        traverse(&a);
    }

    #[test]
    fn plain_values_are_noops() {
        traverse(&Value::Int(1));
        traverse(&Value::Null);
        traverse(&Value::str("x"));
    }
}
