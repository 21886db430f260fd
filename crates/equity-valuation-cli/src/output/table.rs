use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use crate::output::{column_headers, plain};

/// Format output as tables using the tabled crate.
///
/// Scalars of the result go into one Field/Value table; every array of
/// objects inside it (schedules, grids, ratio rows) gets its own table.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(result) => print_envelope(result, map),
            None => print_object(map),
        },
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{value}"),
    }
}

fn print_envelope(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(res_map) => print_object(res_map),
        Value::Array(arr) => print_array_table(arr),
        other => println!("{}", plain(other)),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {w}");
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {meth}");
    }
}

fn print_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut sections: Vec<(&String, &Value)> = Vec::new();

    for (key, val) in map {
        match val {
            Value::Array(rows) if rows.iter().any(Value::is_object) => sections.push((key, val)),
            Value::Object(_) => sections.push((key, val)),
            _ => builder.push_record([key.as_str(), &format_value(val)]),
        }
    }
    println!("{}", Table::from(builder));

    for (key, section) in sections {
        println!("\n{key}:");
        match section {
            Value::Object(inner) => print_object(inner),
            Value::Array(rows) => print_array_table(rows),
            _ => {}
        }
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if arr.iter().any(Value::is_object) {
        let headers = column_headers(arr);
        let mut builder = Builder::default();
        builder.push_record(&headers);
        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        other => plain(other),
    }
}
