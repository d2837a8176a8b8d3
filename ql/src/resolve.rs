//! Operator resolution for filter leaves.
//!
//! A filter entry such as `{ "author": { "country": { "_eq": "NL" } } }` is walked one level at a
//! time: [`resolve_field_path`] collects the field segments (`["author", "country"]`) and
//! [`resolve_operator`] finds the leaf operation (`_eq`, `"NL"`). Both walks stop at the first key
//! that is a *known* operator, so a column called `_private` is still a path segment.

use serde_json::Value;

use crate::ast::{is_reserved_key, Operation, Operator, DEFAULT_MAX_DEPTH};

/// Resolve the leaf operation of a filter entry.
///
/// Returns `None` when the entry has no leaf at all (an empty object somewhere along the way) or
/// when nesting runs past [`DEFAULT_MAX_DEPTH`].
pub fn resolve_operator<'a>(key: &'a str, value: &'a Value) -> Option<Operation<'a>> {
    let mut key = key;
    let mut value = value;

    for _ in 0..=DEFAULT_MAX_DEPTH {
        if let Some(operator) = Operator::from_token(key) {
            return Some(Operation { operator, value });
        }

        match value {
            Value::Object(map) => {
                let (child_key, child_value) = map.iter().next()?;
                key = child_key;
                value = child_value;
            }
            _ => return Some(Operation { operator: Operator::Eq, value }),
        }
    }

    None
}

/// Collect the field path of a filter entry, starting with `key` itself.
pub fn resolve_field_path(key: &str, value: &Value) -> Vec<String> { resolve_field_path_within(key, value, DEFAULT_MAX_DEPTH) }

/// [`resolve_field_path`] with a caller-configured nesting limit.
pub fn resolve_field_path_within(key: &str, value: &Value, max_depth: usize) -> Vec<String> {
    let mut path = vec![key.to_owned()];
    let mut current = value;

    while path.len() <= max_depth {
        let Some((child_key, child_value)) = current.as_object().and_then(|map| map.iter().next()) else {
            break;
        };
        if is_reserved_key(child_key) {
            break;
        }
        path.push(child_key.clone());
        current = child_value;
    }

    path
}

/// Both halves at once: the field path and the leaf operation.
pub fn resolve_leaf<'a>(key: &'a str, value: &'a Value) -> Option<(Vec<String>, Operation<'a>)> {
    let operation = resolve_operator(key, value)?;
    Some((resolve_field_path(key, value), operation))
}
