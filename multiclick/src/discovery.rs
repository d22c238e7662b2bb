//! Scanning the host document for eligible controls and grouping them by
//! label so the operator can pick a pattern.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::element::Control;
use crate::errors::AutomationError;
use crate::host::DomEngine;

/// A set of controls sharing one exact trimmed label.
///
/// Derived and ephemeral: built fresh on every scan, never persisted across
/// scans.
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub label: String,
    pub count: usize,
    pub members: Vec<Control>,
}

#[derive(Clone)]
pub struct Discovery {
    engine: Arc<dyn DomEngine>,
}

impl Discovery {
    pub fn new(engine: Arc<dyn DomEngine>) -> Self {
        Self { engine }
    }

    /// All eligible controls in document order: visible, enabled, and with a
    /// non-empty trimmed label. Highlight state never affects the result.
    pub async fn scan(&self) -> Result<Vec<Control>, AutomationError> {
        let all = self.engine.controls().await?;
        let total = all.len();
        let eligible: Vec<Control> = all
            .into_iter()
            .filter(|c| c.is_visible() && c.is_enabled() && !c.label().is_empty())
            .collect();
        debug!(
            host = self.engine.name(),
            total,
            eligible = eligible.len(),
            "scanned document"
        );
        Ok(eligible)
    }

    /// Group controls by exact trimmed label (case-sensitive), sorted by
    /// descending count with ties broken by ascending label.
    pub fn group(controls: &[Control]) -> Vec<PatternGroup> {
        let mut by_label: HashMap<String, Vec<Control>> = HashMap::new();
        for control in controls {
            by_label
                .entry(control.label())
                .or_default()
                .push(control.clone());
        }
        let mut groups: Vec<PatternGroup> = by_label
            .into_iter()
            .map(|(label, members)| PatternGroup {
                label,
                count: members.len(),
                members,
            })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        groups
    }

    /// Scan and group in one call.
    pub async fn scan_groups(&self) -> Result<Vec<PatternGroup>, AutomationError> {
        Ok(Self::group(&self.scan().await?))
    }

    /// Eligible controls whose trimmed label equals `label` exactly. Called
    /// at session start and on every rescan.
    pub async fn find_by_label(&self, label: &str) -> Result<Vec<Control>, AutomationError> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|c| c.label() == label)
            .collect())
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("host", &self.engine.name())
            .finish()
    }
}
