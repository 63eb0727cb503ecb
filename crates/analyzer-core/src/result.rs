//! Response body of `POST /api/analyze`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Metric;

/// Analysis output: per-transaction pricing plus the whale aggregation
///
/// Either sequence may be missing from a response; a missing sequence is
/// treated as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// One record per CSV row, in input order
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
    /// Wallets that bought below the market-cap threshold
    #[serde(default)]
    pub whale_report: Vec<WhaleRecord>,
}

/// A priced transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction signature
    #[serde(rename = "Signature", default)]
    pub signature: String,
    /// ISO-8601 timestamp as sent by the server
    #[serde(rename = "Human Time", default, skip_serializing_if = "Option::is_none")]
    pub human_time: Option<String>,
    /// TOKEN2 price in USD
    #[serde(rename = "TOKEN2_USD_Price", default)]
    pub token_usd_price: Metric,
    /// Market cap in USD at this price
    #[serde(rename = "Market_Cap_USD", default)]
    pub market_cap_usd: Metric,
    /// Fields this client does not interpret, kept for export
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Aggregated early-buyer position of one wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhaleRecord {
    /// Wallet address
    #[serde(rename = "Wallet", default)]
    pub wallet: String,
    /// SOL invested below the threshold
    #[serde(rename = "Total_SOL", default)]
    pub total_sol: Metric,
    /// USD value of that SOL
    #[serde(rename = "Total_USD", default)]
    pub total_usd: Metric,
    /// Mean market cap over the wallet's qualifying buys
    #[serde(rename = "Avg_Market_Cap_USD", default)]
    pub avg_market_cap_usd: Metric,
    /// Fields this client does not interpret, kept for export
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResult {
    /// Whether both sequences are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.whale_report.is_empty()
    }
}
