//! Persisted operator settings.
//!
//! Two scalars: the inter-click interval and whether to smooth-scroll
//! targets into view. The store must tolerate a missing file, malformed
//! JSON, and a non-numeric interval — all of those fall back to defaults
//! rather than failing a session start.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::errors::AutomationError;

/// Interval applied when the setting is absent or unusable.
pub const DEFAULT_INTERVAL_SECONDS: f64 = 20.0;
/// Hard floor for the configured interval.
pub const MIN_INTERVAL_SECONDS: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Base inter-click interval in seconds.
    #[serde(deserialize_with = "lenient_seconds")]
    pub interval_seconds: Option<f64>,
    /// Smooth-scroll each target into view before clicking.
    pub smooth_scroll: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_seconds: None,
            smooth_scroll: true,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load(path: &Path) -> Settings {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings not readable, using defaults");
                return Settings::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings malformed, using defaults");
                Settings::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AutomationError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| AutomationError::Internal(format!("serialize settings: {e}")))?;
        std::fs::write(path, raw)
            .map_err(|e| AutomationError::Internal(format!("write settings: {e}")))
    }

    /// The interval a new session should use: configured value clamped to
    /// the floor, or the default when unset.
    pub fn effective_interval(&self) -> f64 {
        clamp_interval(self.interval_seconds)
    }
}

/// Apply default and floor to an optional configured interval.
pub fn clamp_interval(seconds: Option<f64>) -> f64 {
    match seconds {
        Some(s) if s.is_finite() && s > 0.0 => s.max(MIN_INTERVAL_SECONDS),
        _ => DEFAULT_INTERVAL_SECONDS,
    }
}

/// Accept a number, a numeric string, or garbage (mapped to `None`) for the
/// interval field. Popups have historically sent all three.
pub(crate) fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
