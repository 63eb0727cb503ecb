//! Form controller and the state it drives

use analyzer_core::AnalysisResult;
use tracing::{info, warn};

use super::api::AnalyzeApi;
use super::form::FormInput;
use crate::export::{self, Download, ExportFormat};
use crate::render::{self, Tab};
use crate::Result;

/// What the results area currently shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Nothing submitted yet
    Idle,
    /// Request in flight
    Loading,
    /// Last submission succeeded
    Results,
    /// Last submission failed; carries the banner text
    Error(String),
}

/// All client state, owned by one [`Controller`]
#[derive(Debug, Clone)]
pub struct AppState {
    view: View,
    active_tab: Tab,
    result: Option<AnalysisResult>,
    submit_enabled: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            view: View::Idle,
            active_tab: Tab::Transactions,
            result: None,
            submit_enabled: true,
        }
    }
}

impl AppState {
    /// Current view
    #[must_use]
    pub fn view(&self) -> &View {
        &self.view
    }

    /// Tab whose table is visible
    #[must_use]
    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    /// Result of the last successful run
    #[must_use]
    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// Whether a request is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.view == View::Loading
    }

    /// Whether the submit control accepts clicks
    #[must_use]
    pub fn submit_enabled(&self) -> bool {
        self.submit_enabled
    }

    /// Error banner text, if any
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.view {
            View::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Switch tabs; returns whether anything changed
    pub fn select_tab(&mut self, tab: Tab) -> bool {
        let changed = self.active_tab != tab;
        self.active_tab = tab;
        changed
    }

    fn show_error(&mut self, message: String) {
        self.result = None;
        self.view = View::Error(message);
    }
}

/// Holds the loading state for as long as it lives
///
/// Dropping it (normally, on error, or when the submit future is cancelled)
/// always leaves the loading state and re-enables submission.
struct LoadingGuard<'a> {
    state: &'a mut AppState,
}

impl<'a> LoadingGuard<'a> {
    fn enter(state: &'a mut AppState) -> Self {
        state.view = View::Loading;
        state.result = None;
        state.submit_enabled = false;
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.state.view == View::Loading {
            self.state.view = View::Idle;
        }
        self.state.submit_enabled = true;
    }
}

/// Validates, submits and records the outcome of analysis runs
pub struct Controller<A> {
    api: A,
    state: AppState,
}

impl<A: AnalyzeApi> Controller<A> {
    /// Create a controller in the idle state
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: AppState::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Switch the visible tab
    pub fn select_tab(&mut self, tab: Tab) -> bool {
        self.state.select_tab(tab)
    }

    /// Validate the form and run one analysis
    ///
    /// Validation failures send nothing. Every failure, local or remote,
    /// ends in [`View::Error`] and is also returned to the caller.
    pub async fn submit(&mut self, form: &FormInput) -> Result<&AnalysisResult> {
        let request = match form.validate() {
            Ok(request) => request,
            Err(e) => {
                self.state.show_error(e.to_string());
                return Err(e.into());
            }
        };

        info!(
            file = %request.file.name,
            bytes = request.file.bytes.len(),
            token = %request.token_address,
            "Starting analysis"
        );

        let payload = request.to_payload();
        let outcome = {
            let _loading = LoadingGuard::enter(&mut self.state);
            self.api.analyze(&payload).await
        };

        match outcome {
            Ok(result) => {
                info!(
                    transactions = result.transactions.len(),
                    whales = result.whale_report.len(),
                    "Analysis complete"
                );
                self.state.view = View::Results;
                let stored: &AnalysisResult = self.state.result.insert(result);
                Ok(stored)
            }
            Err(e) => {
                warn!(error = %e, "Analysis failed");
                self.state.show_error(e.user_message());
                Err(e)
            }
        }
    }

    /// Results markup for the active tab, once there are results
    pub fn render_html(&self) -> Option<String> {
        self.state
            .result()
            .map(|result| render::html::results(result, self.state.active_tab))
    }

    /// Export the active tab, once there are results
    pub fn export(&self, format: ExportFormat) -> Result<Option<Download>> {
        self.state
            .result()
            .map(|result| export::export(format, result, self.state.active_tab))
            .transpose()
    }
}
