//! Plain text rendering of serde values:
//! arrays become a table with a header row, objects become `Key: value` lines.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

const MAX_CELL: usize = 32;

pub fn to_text<T: Serialize>(value: &T) -> Result<String> {
    Ok(match serde_json::to_value(value)? {
        Value::Array(items) => format_table(&items),
        Value::Object(obj) => format_single(&obj),
        other => format!("{}\n", format_scalar(&other)),
    })
}

fn format_table(items: &[Value]) -> String {
    let Some(Value::Object(first)) = items.first() else {
        return String::new();
    };
    let columns: Vec<&String> = first.keys().collect();

    let headers: Vec<String> = columns
        .iter()
        .map(|c| humanize_key(c).to_uppercase())
        .collect();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| {
            columns
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    let cell = match item.get(col.as_str()) {
                        None | Some(Value::Null) => "-".to_string(),
                        Some(v) => truncate(&format_scalar(v), MAX_CELL),
                    };
                    widths[i] = widths[i].max(cell.chars().count());
                    cell
                })
                .collect()
        })
        .collect();

    let mut output = String::new();
    for row in std::iter::once(&headers).chain(rows.iter()) {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        output.push_str(line.join(" ").trim_end());
        output.push('\n');
    }
    output
}

fn format_single(obj: &Map<String, Value>) -> String {
    let mut output = String::new();
    for (key, val) in obj {
        let formatted = format_scalar(val);
        if !formatted.is_empty() {
            output.push_str(&format!("{}: {}\n", humanize_key(key), formatted));
        }
    }
    output
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => if *b { "yes" } else { "no" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if let Ok(dt) = s.parse::<DateTime<Utc>>() {
                return dt.format("%Y-%m-%d %H:%M:%S").to_string();
            }
            s.clone()
        }
        Value::Array(arr) => arr.iter().map(format_scalar).collect::<Vec<_>>().join(", "),
        // Nested records such as the resume cursor.
        Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| {
                let v = format_scalar(v);
                format!("{}={}", k, if v.is_empty() { "-" } else { v.as_str() })
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Truncate a string to `max` characters with an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let end = s
        .char_indices()
        .nth(max.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    format!("{}…", &s[..end])
}

/// Convert snake_case key to Title Case.
fn humanize_key(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        context_id: i64,
        name: Option<String>,
        messages: u64,
    }

    #[derive(Serialize)]
    struct Cursor {
        offset_id: i32,
        stop_at: i32,
    }

    #[derive(Serialize)]
    struct Report {
        pages: u32,
        exhausted: bool,
        cursor: Cursor,
    }

    #[test]
    fn arrays_render_as_tables() {
        let rows = vec![
            Row { context_id: -1000000000007, name: Some("News".into()), messages: 250 },
            Row { context_id: 42, name: None, messages: 3 },
        ];
        let out = to_text(&rows).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("CONTEXT ID"));
        assert!(lines[1].contains("News"));
        assert!(lines[2].contains(" - "));
    }

    #[test]
    fn objects_render_as_key_values() {
        let report = Report {
            pages: 3,
            exhausted: true,
            cursor: Cursor { offset_id: 0, stop_at: 250 },
        };
        let out = to_text(&report).unwrap();
        assert!(out.contains("Pages: 3\n"));
        assert!(out.contains("Exhausted: yes\n"));
        assert!(out.contains("Cursor: offset_id=0 stop_at=250\n"));
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héll…");
        assert_eq!(truncate("short", 10), "short");
    }
}
