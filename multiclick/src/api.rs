//! The `{action, ...payload}` message envelope spoken with the popup, and
//! the push events broadcast back to it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::lenient_seconds;
use crate::session::{Progress, SessionSummary};
use crate::Page;

/// Updates older than this are discarded by consumers as stale.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(5);

/// A request from the popup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PopupRequest {
    ScanButtons,
    #[serde(rename_all = "camelCase")]
    HighlightButtons { pattern: String },
    #[serde(rename_all = "camelCase")]
    StartAutomation {
        pattern: String,
        #[serde(default, deserialize_with = "lenient_seconds")]
        interval_seconds: Option<f64>,
    },
    StopAutomation,
}

/// One `{text, count}` entry of a scan response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatternSummary {
    pub text: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    #[serde(default)]
    pub patterns: Vec<PatternSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightResponse {
    pub success: bool,
    #[serde(default)]
    pub highlighted_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_buttons: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Event pushed from the core to every connected popup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AutomationEvent {
    #[serde(rename_all = "camelCase")]
    ProgressUpdate {
        #[serde(flatten)]
        progress: Progress,
        /// Epoch milliseconds, for the consumer-side freshness window.
        ts: u64,
    },
    #[serde(rename_all = "camelCase")]
    AutomationComplete {
        #[serde(flatten)]
        summary: SessionSummary,
        ts: u64,
    },
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl AutomationEvent {
    pub fn progress(progress: Progress) -> Self {
        Self::ProgressUpdate {
            progress,
            ts: now_ms(),
        }
    }

    pub fn complete(summary: SessionSummary) -> Self {
        Self::AutomationComplete {
            summary,
            ts: now_ms(),
        }
    }

    pub fn ts(&self) -> u64 {
        match self {
            Self::ProgressUpdate { ts, .. } | Self::AutomationComplete { ts, .. } => *ts,
        }
    }

    /// Whether this event is recent enough to act on.
    pub fn is_fresh(&self, window: Duration) -> bool {
        now_ms().saturating_sub(self.ts()) <= window.as_millis() as u64
    }
}

fn to_value<T: Serialize>(response: T) -> serde_json::Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        serde_json::json!({ "success": false, "error": format!("serialize response: {e}") })
    })
}

/// Handle one popup request against the page, folding every failure into a
/// structured response. Nothing here is fatal to the host.
pub async fn dispatch(page: &Page, request: PopupRequest) -> serde_json::Value {
    match request {
        PopupRequest::ScanButtons => match page.scan_patterns().await {
            Ok(groups) => to_value(ScanResponse {
                success: true,
                patterns: groups
                    .iter()
                    .map(|g| PatternSummary {
                        text: g.label.clone(),
                        count: g.count,
                    })
                    .collect(),
                error: None,
            }),
            Err(e) => {
                warn!(error = %e, "scanButtons failed");
                to_value(ScanResponse {
                    success: false,
                    patterns: Vec::new(),
                    error: Some(e.to_string()),
                })
            }
        },
        PopupRequest::HighlightButtons { pattern } => {
            match page.highlight_pattern(&pattern).await {
                Ok(highlighted_count) => to_value(HighlightResponse {
                    success: true,
                    highlighted_count,
                    error: None,
                }),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "highlightButtons failed");
                    to_value(HighlightResponse {
                        success: false,
                        highlighted_count: 0,
                        error: Some(e.to_string()),
                    })
                }
            }
        }
        PopupRequest::StartAutomation {
            pattern,
            interval_seconds,
        } => match page.start(&pattern, interval_seconds).await {
            Ok(total_buttons) => to_value(StartResponse {
                success: true,
                total_buttons: Some(total_buttons),
                pattern: Some(pattern),
                error: None,
            }),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "startAutomation rejected");
                to_value(StartResponse {
                    success: false,
                    total_buttons: None,
                    pattern: Some(pattern),
                    error: Some(e.to_string()),
                })
            }
        },
        PopupRequest::StopAutomation => match page.stop().await {
            Ok(()) => to_value(StopResponse {
                success: true,
                error: None,
            }),
            Err(e) => {
                warn!(error = %e, "stopAutomation failed");
                to_value(StopResponse {
                    success: false,
                    error: Some(e.to_string()),
                })
            }
        },
    }
}
