//! Tabular display of collected events for `get-events`.

use cloudsoc_core::{CategoryStats, LogCategory, RawRecord};
use serde_json::Value;

const MAX_CELL_WIDTH: usize = 48;

// ── Column selections ──

const INVESTIGATE: &[&str] = &[
    "_id",
    "user_name",
    "_domain",
    "severity",
    "service",
    "created_timestamp",
    "message",
];

const INCIDENT: &[&str] = &[
    "_id",
    "message",
    "incident_start_time",
    "service",
    "hosts",
    "locations",
    "severity",
];

/// Columns shown for a category's events.
pub fn columns_for(category: &LogCategory) -> Vec<&str> {
    match category.id.as_str() {
        "Investigate_logs" => INVESTIGATE.to_vec(),
        "Incident_logs" => INCIDENT.to_vec(),
        _ => vec![category.id_field.as_str(), category.timestamp_field.as_str()],
    }
}

// ── Public API ──

/// Render one category's events as a titled table.
pub fn render_events(category: &LogCategory, records: &[&RawRecord]) -> String {
    let title = category.id.replace('_', " ");
    if records.is_empty() {
        return format!("No events found for {title}.\n");
    }

    let columns = columns_for(category);
    let headers: Vec<String> = columns.iter().map(|c| header_title(c)).collect();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| columns.iter().map(|c| cell(r.get(c))).collect())
        .collect();

    let widths: Vec<usize> = (0..columns.len())
        .map(|i| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(headers[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = format!("### {title}\n");
    out.push_str(&render_row(&headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&render_row(&rule, &widths));
    for row in &rows {
        out.push_str(&render_row(row, &widths));
    }
    out
}

/// One line per category with the cycle counters.
pub fn render_summary(stats: &[CategoryStats]) -> String {
    let mut out = String::new();
    for s in stats {
        out.push_str(&format!(
            "  {:<26} {} accepted, {} duplicate, {} stale, {} malformed ({} pages)\n",
            s.category_id, s.accepted, s.duplicates, s.stale, s.malformed, s.pages
        ));
    }
    out
}

// ── Cell rendering ──

fn render_row(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(c, w)| format!("{c:<w$}"))
        .collect();
    format!("| {} |\n", padded.join(" | "))
}

/// `incident_start_time` -> `Incident Start Time`.
fn header_title(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell(value: Option<&Value>) -> String {
    let text = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
        Some(other) => other.to_string(),
    };
    let flat = text.replace(['\n', '\r'], " ").replace('|', "/");
    truncate(&flat)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_CELL_WIDTH {
        return s.to_string();
    }
    let kept: String = s.chars().take(MAX_CELL_WIDTH - 3).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn incident() -> LogCategory {
        LogCategory::builtin()[1].clone()
    }

    #[test]
    fn header_titles() {
        assert_eq!(header_title("incident_start_time"), "Incident Start Time");
        assert_eq!(header_title("_id"), "Id");
        assert_eq!(header_title("_domain"), "Domain");
    }

    #[test]
    fn builtin_columns() {
        let cats = LogCategory::builtin();
        assert_eq!(columns_for(&cats[0]), INVESTIGATE);
        assert_eq!(columns_for(&cats[1]), INCIDENT);
    }

    #[test]
    fn custom_category_shows_id_and_timestamp() {
        let mut cat = incident();
        cat.id = "Audit_logs".into();
        cat.timestamp_field = "ts".into();
        assert_eq!(columns_for(&cat), vec!["_id", "ts"]);
    }

    #[test]
    fn empty_category_message() {
        assert_eq!(
            render_events(&incident(), &[]),
            "No events found for Incident logs.\n"
        );
    }

    #[test]
    fn table_has_header_rule_and_rows() {
        let record = RawRecord::from(json!({
            "_id": "abc",
            "message": "policy violation",
            "incident_start_time": "2024-05-01T10:00:00",
            "hosts": ["h1", "h2"],
            "severity": 3
        }));
        let table = render_events(&incident(), &[&record]);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "### Incident logs");
        assert!(lines[1].starts_with("| Id  | Message"));
        assert!(lines[2].starts_with("| --- | ---"));
        assert!(lines[3].contains("| abc | policy violation |"));
        assert!(lines[3].contains("h1, h2"));
        assert!(lines[3].contains("| 3 "));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn long_and_multiline_cells_are_flattened() {
        let long = "x".repeat(100);
        assert_eq!(cell(Some(&json!(long))).chars().count(), MAX_CELL_WIDTH);
        assert_eq!(cell(Some(&json!("a\nb|c"))), "a b/c");
        assert_eq!(cell(None), "");
        assert_eq!(cell(Some(&Value::Null)), "");
    }

    #[test]
    fn summary_lists_counters() {
        let stats = vec![CategoryStats {
            category_id: "Incident_logs".into(),
            pages: 2,
            accepted: 5,
            duplicates: 1,
            stale: 0,
            malformed: 1,
        }];
        let out = render_summary(&stats);
        assert!(out.contains("Incident_logs"));
        assert!(out.contains("5 accepted, 1 duplicate, 0 stale, 1 malformed (2 pages)"));
    }
}
