//! Numeric values that the analysis server may replace with a sentinel

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel the server emits when a value could not be computed
pub const NOT_AVAILABLE: &str = "N/A";

/// A number, or a textual stand-in for one
///
/// Prices and market caps are `"N/A"` when the server could not price a
/// transaction. Some deployments also send pre-formatted strings such as
/// `"12.00 SOL"` for whale totals; those are carried as [`Metric::Text`]
/// and never reformatted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    /// A plain JSON number
    Number(f64),
    /// Any string value, including the `"N/A"` sentinel
    Text(String),
}

impl Metric {
    /// The `"N/A"` sentinel
    #[must_use]
    pub fn not_available() -> Self {
        Self::Text(NOT_AVAILABLE.to_string())
    }

    /// Numeric value, if this is a number
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Whether this is exactly the `"N/A"` sentinel
    #[must_use]
    pub fn is_not_available(&self) -> bool {
        matches!(self, Self::Text(s) if s == NOT_AVAILABLE)
    }
}

impl Default for Metric {
    fn default() -> Self {
        Self::not_available()
    }
}

impl From<f64> for Metric {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Metric {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Raw rendition: numbers in their shortest round-trip form, text verbatim
impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_numbers_and_sentinel() {
        let values: Vec<Metric> = serde_json::from_str(r#"[0.01234, 12, "N/A", "12.00 SOL"]"#).unwrap();
        assert_eq!(values[0], Metric::Number(0.01234));
        assert_eq!(values[1], Metric::Number(12.0));
        assert!(values[2].is_not_available());
        assert_eq!(values[3], Metric::Text("12.00 SOL".to_string()));
    }

    #[test]
    fn display_is_raw() {
        assert_eq!(Metric::Number(12.0).to_string(), "12");
        assert_eq!(Metric::Number(12.5).to_string(), "12.5");
        assert_eq!(Metric::not_available().to_string(), "N/A");
    }

    #[test]
    fn text_is_not_a_number() {
        assert_eq!(Metric::from("N/A").as_f64(), None);
        assert_eq!(Metric::from(3.5).as_f64(), Some(3.5));
        assert!(!Metric::from("n/a").is_not_available());
    }
}
