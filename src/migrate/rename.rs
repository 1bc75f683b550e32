//! Table-driven key renames over a JSON object.

use serde_json::{Map, Value};

/// Old App Insights keys and the names the other query editors use for them.
pub const APP_INSIGHTS_RENAMES: &[(&str, &str)] = &[
    ("xaxis", "timeColumn"),
    ("yaxis", "valueColumn"),
    ("spliton", "segmentColumn"),
    ("groupBy", "dimension"),
    ("groupByOptions", "dimensions"),
    ("filter", "dimensionFilter"),
];

/// Move each `old` key to its `new` name.
///
/// When both keys are present the old key's value wins: it is the one the
/// user last edited under the old editor. An old key holding `null` is
/// removed without touching the new key. Returns the old keys that were
/// consumed.
pub fn rename_fields(
    object: &mut Map<String, Value>,
    table: &[(&'static str, &'static str)],
) -> Vec<&'static str> {
    let mut consumed = Vec::new();
    for (old, new) in table {
        match object.remove(*old) {
            Some(Value::Null) => {}
            Some(value) => {
                object.insert((*new).to_string(), value);
            }
            None => continue,
        }
        consumed.push(*old);
    }
    consumed
}
