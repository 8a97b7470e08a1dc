//! Key-path lookup over vendor metadata trees.
//!
//! Vendor metadata arrives as an arbitrarily nested tree of maps, arrays and
//! scalars. Rather than mapping it onto types, fields are looked up by a
//! dotted key path such as `Information.Image.SizeX` or `Channels.0.Name`.
//! Array elements are addressed by index. Map keys may themselves contain
//! dots (`openslide.mpp-x`): the longest literal key match is tried first.

use std::collections::BTreeMap;

use serde_json::Value;

/// Separator between key path segments.
pub const SEPARATOR: char = '.';

/// Find the value at `path`.
///
/// An empty path returns the tree itself.
pub fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(tree);
    }
    match tree {
        Value::Object(map) => {
            if let Some(value) = map.get(path) {
                return Some(value);
            }
            path.match_indices(SEPARATOR)
                .rev()
                .find_map(|(i, _)| {
                    map.get(&path[..i])
                        .and_then(|child| lookup(child, &path[i + 1..]))
                })
        }
        Value::Array(items) => {
            let (head, rest) = path.split_once(SEPARATOR).unwrap_or((path, ""));
            let index: usize = head.parse().ok()?;
            items.get(index).and_then(|child| lookup(child, rest))
        }
        _ => None,
    }
}

/// Whether a non-null value exists at `path`.
pub fn contains(tree: &Value, path: &str) -> bool {
    lookup(tree, path).is_some_and(|v| !v.is_null())
}

/// The first non-null value among several candidate paths.
pub fn first_of<'a>(tree: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths
        .iter()
        .filter_map(|path| lookup(tree, path))
        .find(|value| !value.is_null())
}

/// Numeric value at `path`, parsing numeric strings.
pub fn lookup_f64(tree: &Value, path: &str) -> Option<f64> {
    as_f64(lookup(tree, path)?)
}

/// String value at `path`; numbers and booleans are rendered.
pub fn lookup_str(tree: &Value, path: &str) -> Option<String> {
    as_string(lookup(tree, path)?)
}

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Flatten a tree into `key path -> value` pairs.
///
/// Keys are prefixed by `namespace` when it is not empty. Null leaves are
/// skipped; empty maps and arrays produce no entry.
pub fn flatten(tree: &Value, namespace: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(tree, namespace.to_string(), &mut out);
    out
}

fn flatten_into(value: &Value, prefix: String, out: &mut BTreeMap<String, String>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", prefix, SEPARATOR, key)
        }
    };
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, join(key), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, join(&i.to_string()), out);
            }
        }
        Value::Null => {}
        scalar => {
            if let Some(s) = as_string(scalar) {
                out.insert(prefix, s);
            }
        }
    }
}
