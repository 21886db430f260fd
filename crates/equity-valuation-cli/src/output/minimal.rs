use serde_json::Value;

use crate::output::plain;

/// Headline figure per result shape, in priority order. A dotted key reads
/// into a nested object.
const HEADLINE_KEYS: [&str; 7] = [
    "dcf.equity_value_per_share",
    "dcf.equity_value",
    "equity_value_per_share",
    "enterprise_value",
    "wacc",
    "irr",
    "moic",
];

/// Print just the key answer from the output.
///
/// Falls back to the row count for tabular results and to the first field
/// of anything else.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    println!("{}", headline(result));
}

fn headline(result: &Value) -> String {
    if let Value::Array(rows) = result {
        return format!("{} rows", rows.len());
    }
    for key in HEADLINE_KEYS {
        let found = key
            .split('.')
            .try_fold(result, |node, part| node.get(part))
            .filter(|v| !v.is_null());
        if let Some(val) = found {
            return plain(val);
        }
    }
    match result.as_object().and_then(|m| m.iter().next()) {
        Some((key, val)) => format!("{key}: {}", plain(val)),
        None => plain(result),
    }
}
