//! Deep merge and query matching over JSON trees.

use serde_json::{Map, Number, Value};

/// Merge `updates` into `base`.
///
/// Objects merge key by key, recursively. Any other value, including a list,
/// replaces what was there.
pub fn deep_merge(base: &mut Map<String, Value>, updates: Map<String, Value>) {
    for (key, incoming) in updates {
        match (base.get_mut(&key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                deep_merge(existing, nested);
            }
            (_, incoming) => {
                base.insert(key, incoming);
            }
        }
    }
}

/// Whether `item` satisfies every `(field, value)` pair in `query`.
///
/// String pairs match by case-insensitive substring, number pairs by numeric
/// value (`1` equals `1.0`), everything else by equality. Non-object items
/// never match.
pub fn matches_query(item: &Value, query: &Map<String, Value>) -> bool {
    let Value::Object(fields) = item else {
        return false;
    };
    query.iter().all(|(key, wanted)| match (fields.get(key), wanted) {
        (None, _) => false,
        (Some(Value::String(have)), Value::String(needle)) => contains_ignore_case(have, needle),
        (Some(Value::Number(have)), Value::Number(wanted)) => numbers_equal(have, wanted),
        (Some(have), wanted) => have == wanted,
    })
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

/// Case-insensitive substring test.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
