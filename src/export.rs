//! Export of the active tab as CSV or JSON
//!
//! Serialisation produces a [`Download`]; a [`DownloadSink`] decides where it
//! ends up. The directory sink stages the bytes in a temporary file next to
//! the destination and renames it into place, so a failed export never
//! leaves a partial file behind.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use analyzer_core::{AnalysisResult, TransactionRecord, WhaleRecord};
use tempfile::NamedTempFile;
use tracing::info;

use crate::render::Tab;
use crate::Result;

/// CSV header of the transactions export
pub const TRANSACTIONS_CSV_HEADER: &str = "Signature,Human Time,TOKEN2/USD Price,Market Cap (USD)";

/// CSV header of the whale report export
pub const WHALE_CSV_HEADER: &str = "Wallet,Total SOL,Total USD,Avg Market Cap USD";

/// Export file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma separated, fixed header
    Csv,
    /// Pretty-printed raw records
    Json,
}

impl ExportFormat {
    /// File extension
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// MIME type
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown export format '{other}' (expected 'csv' or 'json')")),
        }
    }
}

/// A serialised export ready to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Suggested file name
    pub filename: String,
    /// MIME type of `body`
    pub content_type: &'static str,
    /// File contents
    pub body: Vec<u8>,
}

/// Serialise the records of `tab`, and only those
pub fn export(format: ExportFormat, result: &AnalysisResult, tab: Tab) -> Result<Download> {
    let stem = match tab {
        Tab::Transactions => "transactions",
        Tab::WhaleReport => "whale_report",
    };

    let body = match (format, tab) {
        (ExportFormat::Csv, Tab::Transactions) => transactions_csv(&result.transactions),
        (ExportFormat::Csv, Tab::WhaleReport) => whale_csv(&result.whale_report),
        (ExportFormat::Json, Tab::Transactions) => serde_json::to_string_pretty(&result.transactions)?,
        (ExportFormat::Json, Tab::WhaleReport) => serde_json::to_string_pretty(&result.whale_report)?,
    };

    Ok(Download {
        filename: format!("{stem}.{}", format.extension()),
        content_type: format.content_type(),
        body: body.into_bytes(),
    })
}

fn transactions_csv(records: &[TransactionRecord]) -> String {
    let mut out = format!("{TRANSACTIONS_CSV_HEADER}\n");
    for record in records {
        push_line(
            &mut out,
            &[
                record.signature.as_str(),
                record.human_time.as_deref().unwrap_or_default(),
                &record.token_usd_price.to_string(),
                &record.market_cap_usd.to_string(),
            ],
        );
    }
    out
}

fn whale_csv(records: &[WhaleRecord]) -> String {
    let mut out = format!("{WHALE_CSV_HEADER}\n");
    for record in records {
        push_line(
            &mut out,
            &[
                record.wallet.as_str(),
                &record.total_sol.to_string(),
                &record.total_usd.to_string(),
                &record.avg_market_cap_usd.to_string(),
            ],
        );
    }
    out
}

fn push_line(out: &mut String, fields: &[&str]) {
    let line = fields
        .iter()
        .map(|f| quote_field(f))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push('\n');
}

/// Quote only when the field would otherwise break the row
fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Destination for finished exports
pub trait DownloadSink {
    /// Save `download`, returning where it went
    fn deliver(&self, download: &Download) -> Result<PathBuf>;
}

/// Saves exports into a directory under their suggested names
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, download: &Download) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(&download.filename);

        // The temporary is deleted on drop unless persisted
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(&download.body)?;
        staged.flush()?;
        staged.persist(&target).map_err(|e| e.error)?;

        info!(
            path = %target.display(),
            content_type = download.content_type,
            bytes = download.body.len(),
            "Export saved"
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyzer_core::Metric;
    use pretty_assertions::assert_eq;

    fn result() -> AnalysisResult {
        AnalysisResult {
            transactions: vec![
                TransactionRecord {
                    signature: "sig1".to_string(),
                    human_time: Some("2024-01-01T00:00:00Z".to_string()),
                    token_usd_price: Metric::Number(0.01234),
                    market_cap_usd: Metric::Number(12345.678),
                    ..TransactionRecord::default()
                },
                TransactionRecord {
                    signature: "sig2".to_string(),
                    human_time: None,
                    token_usd_price: Metric::from("N/A"),
                    market_cap_usd: Metric::from("N/A"),
                    ..TransactionRecord::default()
                },
            ],
            whale_report: vec![WhaleRecord {
                wallet: "wallet, labelled".to_string(),
                total_sol: Metric::Number(4.3),
                total_usd: Metric::Number(731.0),
                avg_market_cap_usd: Metric::Number(12345.5),
                ..WhaleRecord::default()
            }],
        }
    }

    #[test]
    fn transactions_csv_has_fixed_header_and_raw_values() {
        let download = export(ExportFormat::Csv, &result(), Tab::Transactions).unwrap();
        assert_eq!(download.filename, "transactions.csv");
        assert_eq!(download.content_type, "text/csv");
        assert_eq!(
            String::from_utf8(download.body).unwrap(),
            "Signature,Human Time,TOKEN2/USD Price,Market Cap (USD)\n\
             sig1,2024-01-01T00:00:00Z,0.01234,12345.678\n\
             sig2,,N/A,N/A\n"
        );
    }

    #[test]
    fn whale_csv_quotes_embedded_commas() {
        let download = export(ExportFormat::Csv, &result(), Tab::WhaleReport).unwrap();
        assert_eq!(download.filename, "whale_report.csv");
        assert_eq!(
            String::from_utf8(download.body).unwrap(),
            "Wallet,Total SOL,Total USD,Avg Market Cap USD\n\"wallet, labelled\",4.3,731,12345.5\n"
        );
    }

    #[test]
    fn quote_field_doubles_quotes() {
        assert_eq!(quote_field("plain"), "plain");
        assert_eq!(quote_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn json_export_round_trips_active_tab_only() {
        let original = result();
        let download = export(ExportFormat::Json, &original, Tab::Transactions).unwrap();
        assert_eq!(download.filename, "transactions.json");
        assert_eq!(download.content_type, "application/json");

        let text = String::from_utf8(download.body).unwrap();
        assert!(text.starts_with("[\n  {\n    \"Signature\": \"sig1\""));
        assert!(!text.contains("Wallet"));

        let back: Vec<TransactionRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, original.transactions);
    }

    #[test]
    fn whale_json_round_trips() {
        let original = result();
        let download = export(ExportFormat::Json, &original, Tab::WhaleReport).unwrap();
        let back: Vec<WhaleRecord> = serde_json::from_slice(&download.body).unwrap();
        assert_eq!(back, original.whale_report);
    }

    #[test]
    fn directory_sink_writes_final_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        let download = export(ExportFormat::Json, &result(), Tab::WhaleReport).unwrap();

        let path = sink.deliver(&download).unwrap();

        assert_eq!(path, dir.path().join("whale_report.json"));
        assert_eq!(std::fs::read(&path).unwrap(), download.body);
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
