//! Plain-text table for terminals

use std::fmt::{Display, Write as _};

use analyzer_core::AnalysisResult;
use chrono::{Local, TimeZone};

use super::{Tab, TableView};

/// Active tab as an aligned text table, timestamps in the local zone
#[must_use]
pub fn table(result: &AnalysisResult, tab: Tab) -> String {
    table_in(result, tab, &Local)
}

/// Active tab as an aligned text table, timestamps in `tz`
#[must_use]
pub fn table_in<Tz>(result: &AnalysisResult, tab: Tab, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let view = TableView::build(result, tab, tz);
    let headers = tab.headers();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &view.rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    write_row(&mut out, &headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(&mut out, &rule, &widths);

    if view.rows.is_empty() {
        out.push_str(tab.empty_message());
        out.push('\n');
    }
    for row in &view.rows {
        write_row(&mut out, row, &widths);
    }
    out
}

fn write_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize; 4]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{:<width$}", cell.as_ref()))
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}
