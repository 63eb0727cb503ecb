//! Analysis client: form validation, API submission and view state

mod api;
mod control;
mod controller;
mod form;

pub use api::{AnalyzeApi, HttpAnalyzeApi, GENERIC_FAILURE_MESSAGE, MALFORMED_RESPONSE_MESSAGE};
pub use control::WorkerControl;
pub use controller::{AppState, Controller, View};
pub use form::{AnalysisRequest, CsvUpload, FormInput, ValidationError};
