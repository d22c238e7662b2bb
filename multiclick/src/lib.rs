//! Pattern-matching click automation for same-labeled page controls
//!
//! This crate automates repetitive clicking of controls that share a label:
//! it discovers and groups clickable controls, drives a resumable click loop
//! across asynchronous delays while tolerating page mutation (infinite
//! scroll, dynamically appended controls), and keeps progress/completion
//! accounting consistent under concurrent discovery and clicking. The host
//! document is abstracted behind [`host::DomEngine`]; popups talk to the
//! engine over the [`bridge`] using the [`api`] message envelope.

use std::sync::Arc;

use tracing::instrument;

pub mod api;
pub mod bridge;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod element;
pub mod errors;
pub mod host;
pub mod markers;
pub mod session;
#[cfg(test)]
mod tests;

pub use api::{AutomationEvent, PatternSummary, PopupRequest};
pub use config::Settings;
pub use discovery::{Discovery, PatternGroup};
pub use driver::{Driver, DriverTiming};
pub use element::{Control, ControlImpl, Highlight};
pub use errors::AutomationError;
pub use session::{Progress, Session, SessionStatus, SessionSummary};

/// Holds the outcome of activating one control
#[derive(Debug, Clone)]
pub struct ClickResult {
    pub method: String,
    pub details: String,
}

/// The main entry point for one page context
///
/// Wraps a host engine and drives discovery, highlighting, and the
/// automation loop against it.
#[derive(Clone)]
pub struct Page {
    engine: Arc<dyn host::DomEngine>,
    discovery: Discovery,
    driver: Driver,
    settings: Settings,
}

impl Page {
    /// Page with default settings and production timings.
    pub fn new(engine: Arc<dyn host::DomEngine>) -> Self {
        Self::with_settings(engine, Settings::default(), DriverTiming::default())
    }

    pub fn with_settings(
        engine: Arc<dyn host::DomEngine>,
        settings: Settings,
        timing: DriverTiming,
    ) -> Self {
        let discovery = Discovery::new(engine.clone());
        let driver = Driver::new(engine.clone(), timing, settings.smooth_scroll);
        Self {
            engine,
            discovery,
            driver,
            settings,
        }
    }

    /// Scan the document and group eligible controls by label, best
    /// candidates first.
    #[instrument(level = "debug", skip(self))]
    pub async fn scan_patterns(&self) -> Result<Vec<PatternGroup>, AutomationError> {
        self.discovery.scan_groups().await
    }

    /// Highlight every control matching `label` so the operator can preview
    /// a selection. Replaces any previous preview. Rejected while a session
    /// is running, since the session owns the highlights then.
    #[instrument(level = "debug", skip(self))]
    pub async fn highlight_pattern(&self, label: &str) -> Result<usize, AutomationError> {
        if label.trim().is_empty() {
            return Err(AutomationError::InvalidArgument(
                "pattern must be non-empty".to_string(),
            ));
        }
        if self.driver.is_running().await {
            return Err(AutomationError::AlreadyRunning(label.to_string()));
        }
        self.driver.markers().clear_all();
        let matches = self.discovery.find_by_label(label).await?;
        for control in &matches {
            self.driver.markers().highlight(control, Highlight::Pending)?;
        }
        Ok(matches.len())
    }

    /// Start automating `label`. `interval_seconds` overrides the persisted
    /// setting for this run; either way the interval is defaulted and
    /// floored by the driver. Returns the number of controls matched.
    #[instrument(level = "debug", skip(self))]
    pub async fn start(
        &self,
        label: &str,
        interval_seconds: Option<f64>,
    ) -> Result<usize, AutomationError> {
        let interval = interval_seconds.or(self.settings.interval_seconds);
        self.driver.start(label, interval).await
    }

    /// Stop the active session. Safe when idle.
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&self) -> Result<(), AutomationError> {
        self.driver.stop().await
    }

    /// Subscribe to progress and completion pushes.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AutomationEvent> {
        self.driver.subscribe()
    }

    pub async fn progress(&self) -> Progress {
        self.driver.progress().await
    }

    pub async fn is_running(&self) -> bool {
        self.driver.is_running().await
    }

    /// Page-unload hook: force-stop any running session and clear all
    /// transient markers before the context is torn down.
    pub async fn shutdown(&self) {
        let _ = self.driver.stop().await;
    }

    pub fn engine(&self) -> &Arc<dyn host::DomEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("host", &self.engine.name())
            .finish()
    }
}
