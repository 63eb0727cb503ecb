//! Token analyzer core library
//!
//! Wire-level records exchanged with the `/api/analyze` endpoint. Everything
//! that renders, exports or caches analysis output builds on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod metric;
mod payload;
mod result;

pub use metric::{Metric, NOT_AVAILABLE};
pub use payload::AnalyzePayload;
pub use result::{AnalysisResult, TransactionRecord, WhaleRecord};
