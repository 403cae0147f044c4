//! Dot-path access into nested JSON data bags.
//!
//! Updates go through an explicit recursive merge over object maps, and
//! every write path is validated against the set of paths the caller knows
//! about. A typo'd path is an error, never a silently created field.

use serde_json::{Map, Value};

/// Read the value at a dot path, e.g. `application.buyer_name`.
pub fn lookup<'a>(bag: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = bag;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Recursively merge `overlay` into `base`.
///
/// Object members merge member-wise; any other value in the overlay
/// replaces the base value outright. `Null` in the overlay clears the
/// member.
pub fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) if base_value.is_object() && overlay_value.is_object() => {
                        merge(base_value, overlay_value);
                    }
                    _ => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Write `value` at `path`, validating the path against the known set.
///
/// Intermediate objects are created as needed, but only for paths the
/// schema actually declares.
pub fn set_path(
    root: &mut Value,
    path: &str,
    value: Value,
    known_paths: &[&str],
) -> Result<(), String> {
    if !known_paths.contains(&path) {
        return Err(format!("unknown data path: {}", path));
    }

    let patch = nest(path, value)?;
    merge(root, &patch);
    Ok(())
}

/// Build a single-path nested object: `a.b.c` + v => `{"a":{"b":{"c":v}}}`.
fn nest(path: &str, value: Value) -> Result<Value, String> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(format!("malformed data path: {}", path));
    }

    let mut current = value;
    for segment in segments.into_iter().rev() {
        let mut map = Map::new();
        map.insert(segment.to_string(), current);
        current = Value::Object(map);
    }
    Ok(current)
}
