//! Form input and its validation

use std::path::Path;

use analyzer_core::AnalyzePayload;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use thiserror::Error;

use crate::Result;

/// Why the form was rejected; `Display` is the message shown to the user
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// No CSV chosen
    #[error("Please upload a CSV file")]
    MissingFile,
    /// SOL/USD price missing, not a number, or not positive
    #[error("Please enter a valid SOL/USD price")]
    InvalidSolPrice,
    /// Token address blank
    #[error("Please enter a token address")]
    MissingTokenAddress,
    /// Total supply missing, not a number, or not positive
    #[error("Please enter a valid total supply")]
    InvalidTotalSupply,
    /// Threshold missing, not a number, or not positive
    #[error("Please enter a valid market cap threshold")]
    InvalidMarketCapThreshold,
}

/// A CSV file picked by the user
#[derive(Debug, Clone, PartialEq)]
pub struct CsvUpload {
    /// File name as shown in the upload control
    pub name: String,
    /// Raw file contents
    pub bytes: Bytes,
}

impl CsvUpload {
    /// Wrap in-memory contents
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(name, bytes))
    }

    /// Contents as standard padded base64
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Raw form state, exactly as typed
#[derive(Debug, Clone, Default)]
pub struct FormInput {
    /// Chosen file, if any
    pub file: Option<CsvUpload>,
    /// SOL/USD price field
    pub sol_price: String,
    /// Token address field
    pub token_address: String,
    /// Total supply field
    pub total_supply: String,
    /// Market cap threshold field
    pub market_cap_threshold: String,
}

impl FormInput {
    /// Form pre-filled with the page's default values and no file
    #[must_use]
    pub fn prefilled() -> Self {
        Self {
            file: None,
            sol_price: "170".to_string(),
            token_address: "CfVs3waH2Z9TM397qSkaipTDhA9wWgtt8UchZKfwkYiu".to_string(),
            total_supply: "999982230.99".to_string(),
            market_cap_threshold: "5000000".to_string(),
        }
    }

    /// Check fields in display order; the first failure wins
    pub fn validate(&self) -> std::result::Result<AnalysisRequest, ValidationError> {
        let file = self.file.clone().ok_or(ValidationError::MissingFile)?;
        let sol_usd_price =
            parse_positive(&self.sol_price).ok_or(ValidationError::InvalidSolPrice)?;
        let token_address = self.token_address.trim();
        if token_address.is_empty() {
            return Err(ValidationError::MissingTokenAddress);
        }
        let total_supply =
            parse_positive(&self.total_supply).ok_or(ValidationError::InvalidTotalSupply)?;
        let market_cap_threshold = parse_positive(&self.market_cap_threshold)
            .ok_or(ValidationError::InvalidMarketCapThreshold)?;

        Ok(AnalysisRequest {
            file,
            sol_usd_price,
            token_address: token_address.to_string(),
            total_supply,
            market_cap_threshold,
        })
    }
}

/// Finite and strictly positive
fn parse_positive(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Validated analysis parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    /// CSV to analyse
    pub file: CsvUpload,
    /// SOL/USD price
    pub sol_usd_price: f64,
    /// Token mint address
    pub token_address: String,
    /// Total token supply
    pub total_supply: f64,
    /// Early-buyer market cap threshold
    pub market_cap_threshold: f64,
}

impl AnalysisRequest {
    /// JSON body with the file inlined as base64
    #[must_use]
    pub fn to_payload(&self) -> AnalyzePayload {
        AnalyzePayload {
            csv_base64: self.file.to_base64(),
            sol_usd_price: self.sol_usd_price,
            token_address: self.token_address.clone(),
            total_supply: self.total_supply,
            market_cap_threshold: self.market_cap_threshold,
        }
    }
}
