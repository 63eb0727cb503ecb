//! HTML rendition of the results area

use std::fmt::{Display, Write as _};

use analyzer_core::AnalysisResult;
use chrono::{Local, TimeZone};

use super::{Tab, TableView};

/// Escape text for element content and double-quoted attributes
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// `<tbody>` contents for one tab
#[must_use]
pub fn table_body(view: &TableView) -> String {
    if view.rows.is_empty() {
        return format!(
            "<tr><td colspan=\"4\" style=\"text-align: center;\">{}</td></tr>",
            view.tab.empty_message()
        );
    }

    let mut out = String::new();
    for row in &view.rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(cell));
        }
        out.push_str("</tr>");
    }
    out
}

/// Tabs plus both tables, timestamps in the local zone
#[must_use]
pub fn results(result: &AnalysisResult, active: Tab) -> String {
    results_in(result, active, &Local)
}

/// Tabs plus both tables, timestamps in `tz`
///
/// Both panes are always rendered; only the active one carries the
/// `active` class, so switching tabs never needs the data again.
#[must_use]
pub fn results_in<Tz>(result: &AnalysisResult, active: Tab, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut out = String::from("<div id=\"results-container\" class=\"results-container\">\n");

    out.push_str("  <div class=\"tab-container\">\n");
    for tab in Tab::ALL {
        let _ = writeln!(
            out,
            "    <div class=\"{}\" data-tab=\"{}\">{}</div>",
            active_class("tab", tab == active),
            tab.id(),
            tab.label()
        );
    }
    out.push_str("  </div>\n");

    for tab in Tab::ALL {
        let view = TableView::build(result, tab, tz);
        let _ = writeln!(
            out,
            "  <div id=\"{id}-tab\" class=\"{class}\">\n    <div class=\"table-container\">\n      <table>\n        <thead><tr>{head}</tr></thead>\n        <tbody id=\"{id}-table\">{body}</tbody>\n      </table>\n    </div>\n  </div>",
            id = tab.id(),
            class = active_class("tab-content", tab == active),
            head = tab
                .headers()
                .iter()
                .map(|h| format!("<th>{h}</th>"))
                .collect::<String>(),
            body = table_body(&view),
        );
    }

    out.push_str("</div>\n");
    out
}

fn active_class(base: &str, active: bool) -> String {
    if active {
        format!("{base} active")
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyzer_core::{Metric, TransactionRecord};
    use chrono::Utc;

    fn stub() -> AnalysisResult {
        AnalysisResult {
            transactions: vec![TransactionRecord {
                signature: "sig1".to_string(),
                human_time: Some("2024-01-01T00:00:00Z".to_string()),
                token_usd_price: Metric::Number(0.01234),
                market_cap_usd: Metric::Number(12345.678),
                ..TransactionRecord::default()
            }],
            whale_report: vec![],
        }
    }

    #[test]
    fn transaction_row_is_formatted() {
        let view = TableView::build(&stub(), Tab::Transactions, &Utc);
        assert_eq!(
            table_body(&view),
            "<tr><td>sig1</td><td>1/1/2024, 12:00:00 AM</td><td>0.0123</td><td>$12,345.68</td></tr>"
        );
    }

    #[test]
    fn empty_tab_renders_placeholder() {
        let view = TableView::build(&stub(), Tab::WhaleReport, &Utc);
        assert_eq!(
            table_body(&view),
            "<tr><td colspan=\"4\" style=\"text-align: center;\">No whale data available</td></tr>"
        );
    }

    #[test]
    fn cells_are_escaped() {
        let mut result = stub();
        result.transactions[0].signature = "<script>alert('x')</script>".to_string();
        let html = results_in(&result, Tab::Transactions, &Utc);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
    }

    #[test]
    fn only_active_tab_is_marked() {
        let html = results_in(&stub(), Tab::WhaleReport, &Utc);
        assert!(html.contains("<div class=\"tab active\" data-tab=\"whale-report\">"));
        assert!(html.contains("<div class=\"tab\" data-tab=\"transactions\">"));
        assert!(html.contains("<div id=\"whale-report-tab\" class=\"tab-content active\">"));
        assert!(html.contains("<div id=\"transactions-tab\" class=\"tab-content\">"));
    }

    #[test]
    fn rendering_same_tab_twice_is_identical() {
        let result = stub();
        assert_eq!(
            results_in(&result, Tab::Transactions, &Utc),
            results_in(&result, Tab::Transactions, &Utc)
        );
    }
}
