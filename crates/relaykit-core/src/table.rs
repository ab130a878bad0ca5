//! JSON rows to Markdown table.

use serde_json::Value;

/// Text returned when there are no rows to render.
pub const EMPTY_TABLE: &str = "No data available";

/// Render a list of JSON objects as a Markdown table.
///
/// Columns are the keys of the first row in their original order.  Later
/// rows that lack a column get an empty cell; extra keys are ignored.
/// Strings are written raw, everything else as compact JSON.
pub fn json_to_table(rows: &[Value]) -> String {
    let Some(first) = rows.first().and_then(Value::as_object) else {
        return EMPTY_TABLE.to_string();
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(headers.join(" | "));
    lines.push(vec!["---"; headers.len()].join(" | "));

    for row in rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| row.get(*h).map(cell_text).unwrap_or_default())
            .collect();
        lines.push(cells.join(" | "));
    }

    lines.join("\n")
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
