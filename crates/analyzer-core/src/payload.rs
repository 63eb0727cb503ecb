//! Request body for `POST /api/analyze`

use serde::{Deserialize, Serialize};

/// JSON request body
///
/// The CSV travels base64-encoded under `csv_base64`; the numeric fields are
/// native JSON numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzePayload {
    /// Base64 (standard alphabet, padded) CSV contents
    pub csv_base64: String,
    /// SOL/USD price
    pub sol_usd_price: f64,
    /// Mint address of the analysed token
    pub token_address: String,
    /// Total token supply
    pub total_supply: f64,
    /// Market cap below which buyers count as early
    pub market_cap_threshold: f64,
}
