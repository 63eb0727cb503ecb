//! Result rendering: cell formatting, HTML tables and a terminal table

pub mod format;
pub mod html;
pub mod text;

use std::fmt;
use std::str::FromStr;

use analyzer_core::{AnalysisResult, TransactionRecord, WhaleRecord};
use chrono::TimeZone;

/// Result tabs; exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tab {
    /// Per-transaction prices
    #[default]
    Transactions,
    /// Early-buyer aggregation
    WhaleReport,
}

impl Tab {
    /// Both tabs in display order
    pub const ALL: [Tab; 2] = [Tab::Transactions, Tab::WhaleReport];

    /// `data-tab` identifier
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::WhaleReport => "whale-report",
        }
    }

    /// Tab caption
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Transactions => "Transactions",
            Self::WhaleReport => "Whale Report",
        }
    }

    /// Visible column headers
    #[must_use]
    pub fn headers(self) -> [&'static str; 4] {
        match self {
            Self::Transactions => ["Signature", "Time", "TOKEN2/USD Price", "Market Cap"],
            Self::WhaleReport => ["Wallet", "Total SOL", "Total USD", "Avg Market Cap"],
        }
    }

    /// Placeholder row text for an empty table
    #[must_use]
    pub fn empty_message(self) -> &'static str {
        match self {
            Self::Transactions => "No transaction data available",
            Self::WhaleReport => "No whale data available",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transactions" => Ok(Self::Transactions),
            "whale-report" | "whale_report" | "whales" => Ok(Self::WhaleReport),
            other => Err(format!(
                "unknown tab '{other}' (expected 'transactions' or 'whale-report')"
            )),
        }
    }
}

/// Formatted cells of one tab, ready for any output medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableView {
    /// Which tab this is
    pub tab: Tab,
    /// Formatted rows; empty means the placeholder row is shown
    pub rows: Vec<[String; 4]>,
}

impl TableView {
    /// Format `tab` of `result`, rendering timestamps in `tz`
    pub fn build<Tz>(result: &AnalysisResult, tab: Tab, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let rows = match tab {
            Tab::Transactions => result
                .transactions
                .iter()
                .map(|t| transaction_cells(t, tz))
                .collect(),
            Tab::WhaleReport => result.whale_report.iter().map(whale_cells).collect(),
        };
        Self { tab, rows }
    }
}

fn transaction_cells<Tz>(record: &TransactionRecord, tz: &Tz) -> [String; 4]
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    [
        record.signature.clone(),
        format::format_datetime_in(record.human_time.as_deref(), tz),
        format::format_price(&record.token_usd_price),
        format::format_market_cap(&record.market_cap_usd),
    ]
}

// Whale values are shown raw, exactly as received.
fn whale_cells(record: &WhaleRecord) -> [String; 4] {
    [
        record.wallet.clone(),
        record.total_sol.to_string(),
        record.total_usd.to_string(),
        record.avg_market_cap_usd.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyzer_core::Metric;
    use chrono::Utc;

    #[test]
    fn tab_ids_round_trip() {
        for tab in Tab::ALL {
            assert_eq!(tab.id().parse::<Tab>().unwrap(), tab);
        }
        assert!("summary".parse::<Tab>().is_err());
    }

    #[test]
    fn whale_cells_are_raw() {
        let result = AnalysisResult {
            transactions: vec![],
            whale_report: vec![WhaleRecord {
                wallet: "w1".to_string(),
                total_sol: Metric::Number(4.3),
                total_usd: Metric::from("$731.00"),
                avg_market_cap_usd: Metric::Number(1_000_000.0),
                ..WhaleRecord::default()
            }],
        };
        let view = TableView::build(&result, Tab::WhaleReport, &Utc);
        assert_eq!(view.rows[0], ["w1", "4.3", "$731.00", "1000000"].map(String::from));
    }
}
