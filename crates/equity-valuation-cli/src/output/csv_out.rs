use serde_json::{Map, Value};
use std::io;

use crate::output::{column_headers, plain};

/// Write the result as CSV on stdout.
///
/// Arrays of objects become one row per element; a sensitivity grid becomes
/// a matrix with the discount rate in the first column; any other object is
/// written as field,value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    let _ = write_value(&mut wtr, result);
    let _ = wtr.flush();
}

pub(crate) fn write_value<W: io::Write>(wtr: &mut csv::Writer<W>, value: &Value) -> csv::Result<()> {
    match value {
        Value::Array(rows) => write_rows(wtr, rows),
        Value::Object(map) if map.contains_key("matrix") => write_grid(wtr, map),
        Value::Object(map) => {
            wtr.write_record(["field", "value"])?;
            for (key, val) in map {
                wtr.write_record([key.as_str(), &plain(val)])?;
            }
            Ok(())
        }
        other => wtr.write_record([plain(other)]),
    }
}

pub(crate) fn write_rows<W: io::Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) -> csv::Result<()> {
    if rows.iter().any(Value::is_object) {
        let headers = column_headers(rows);
        wtr.write_record(&headers)?;
        for row in rows {
            if let Value::Object(map) = row {
                let record: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(plain).unwrap_or_default())
                    .collect();
                wtr.write_record(&record)?;
            }
        }
    } else {
        for row in rows {
            wtr.write_record([plain(row)])?;
        }
    }
    Ok(())
}

fn write_grid<W: io::Write>(wtr: &mut csv::Writer<W>, grid: &Map<String, Value>) -> csv::Result<()> {
    let empty = Vec::new();
    let as_array = |key: &str| grid.get(key).and_then(Value::as_array).unwrap_or(&empty);
    let kind = grid.get("terminal_kind").map(plain).unwrap_or_default();

    let mut header = vec![format!("discount_rate \\ {kind}")];
    header.extend(as_array("terminal_parameters").iter().map(plain));
    wtr.write_record(&header)?;

    for (rate, cells) in as_array("discount_rates").iter().zip(as_array("matrix")) {
        let mut record = vec![plain(rate)];
        if let Value::Array(cells) = cells {
            record.extend(cells.iter().map(plain));
        }
        wtr.write_record(&record)?;
    }
    Ok(())
}
