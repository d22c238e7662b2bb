//! In-memory host document used by tests and headless runs.
//!
//! Models a page of labeled buttons that can be hidden, disabled, or set to
//! reject activation, and that can grow mid-run — either explicitly via
//! [`SimulatedPage::push_button`] or lazily via
//! [`SimulatedPage::spawn_on_click`], which emulates infinite scroll pages
//! that append more controls as existing ones are consumed.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::element::{Control, ControlImpl, Highlight};
use crate::errors::AutomationError;
use crate::host::DomEngine;
use crate::ClickResult;

#[derive(Debug, Clone)]
struct Node {
    id: usize,
    label: String,
    visible: bool,
    enabled: bool,
    reject_clicks: bool,
    clicks: u32,
    highlight: Option<Highlight>,
}

#[derive(Debug, Clone)]
struct SpawnRule {
    label: String,
    per_click: usize,
    remaining: usize,
}

#[derive(Debug, Default)]
struct PageModel {
    next_id: usize,
    nodes: Vec<Node>,
    spawn_rule: Option<SpawnRule>,
}

impl PageModel {
    fn push(&mut self, label: &str, visible: bool, enabled: bool, reject_clicks: bool) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push(Node {
            id,
            label: label.to_string(),
            visible,
            enabled,
            reject_clicks,
            clicks: 0,
            highlight: None,
        });
        id
    }

    fn apply_spawn_rule(&mut self) {
        let Some(rule) = self.spawn_rule.as_mut() else {
            return;
        };
        let spawn = rule.per_click.min(rule.remaining);
        rule.remaining -= spawn;
        let label = rule.label.clone();
        if rule.remaining == 0 {
            self.spawn_rule = None;
        }
        for _ in 0..spawn {
            self.push(&label, true, true, false);
        }
    }
}

/// A simulated page shared between its controls and the engine.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPage {
    model: Arc<Mutex<PageModel>>,
}

impl SimulatedPage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PageModel> {
        self.model.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a visible, enabled button. Returns its id.
    pub fn push_button(&self, label: &str) -> usize {
        self.lock().push(label, true, true, false)
    }

    /// Append a button that is present in the document but not rendered.
    pub fn push_hidden(&self, label: &str) -> usize {
        self.lock().push(label, false, true, false)
    }

    /// Append a visible but disabled button.
    pub fn push_disabled(&self, label: &str) -> usize {
        self.lock().push(label, true, false, false)
    }

    /// Append a button whose activation the host rejects.
    pub fn push_rejecting(&self, label: &str) -> usize {
        self.lock().push(label, true, true, true)
    }

    /// After each successful click anywhere on the page, append `per_click`
    /// new buttons with the given label, up to `cap` total.
    pub fn spawn_on_click(&self, label: &str, per_click: usize, cap: usize) {
        self.lock().spawn_rule = Some(SpawnRule {
            label: label.to_string(),
            per_click,
            remaining: cap,
        });
    }

    pub fn click_count(&self, id: usize) -> u32 {
        self.lock()
            .nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.clicks)
            .unwrap_or(0)
    }

    pub fn total_clicks(&self) -> u32 {
        self.lock().nodes.iter().map(|n| n.clicks).sum()
    }

    pub fn button_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn highlight_of(&self, id: usize) -> Option<Highlight> {
        self.lock()
            .nodes
            .iter()
            .find(|n| n.id == id)
            .and_then(|n| n.highlight)
    }

    pub fn highlighted_count(&self) -> usize {
        self.lock()
            .nodes
            .iter()
            .filter(|n| n.highlight.is_some())
            .count()
    }

    /// Build a control handle for an existing node.
    pub fn control(&self, id: usize) -> Option<Control> {
        let exists = self.lock().nodes.iter().any(|n| n.id == id);
        exists.then(|| {
            Control::new(Box::new(SimulatedControl {
                id,
                model: self.model.clone(),
            }))
        })
    }
}

#[derive(Debug, Clone)]
struct SimulatedControl {
    id: usize,
    model: Arc<Mutex<PageModel>>,
}

impl SimulatedControl {
    fn with_node<R>(&self, f: impl FnOnce(&mut Node) -> R) -> Result<R, AutomationError> {
        let mut model = self.model.lock().unwrap_or_else(|e| e.into_inner());
        let node = model
            .nodes
            .iter_mut()
            .find(|n| n.id == self.id)
            .ok_or_else(|| AutomationError::ElementNotFound(format!("simulated node {}", self.id)))?;
        Ok(f(node))
    }
}

impl ControlImpl for SimulatedControl {
    fn object_id(&self) -> usize {
        self.id
    }

    fn label(&self) -> String {
        self.with_node(|n| n.label.clone()).unwrap_or_default()
    }

    fn is_visible(&self) -> Result<bool, AutomationError> {
        self.with_node(|n| n.visible)
    }

    fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.with_node(|n| n.enabled)
    }

    fn click(&self) -> Result<ClickResult, AutomationError> {
        let mut model = self.model.lock().unwrap_or_else(|e| e.into_inner());
        let node = model
            .nodes
            .iter_mut()
            .find(|n| n.id == self.id)
            .ok_or_else(|| AutomationError::ElementNotFound(format!("simulated node {}", self.id)))?;
        if node.reject_clicks {
            return Err(AutomationError::ActivationFailed(format!(
                "simulated node {} refuses clicks",
                self.id
            )));
        }
        node.clicks += 1;
        model.apply_spawn_rule();
        Ok(ClickResult {
            method: "Simulated".to_string(),
            details: format!("node {}", self.id),
        })
    }

    fn scroll_into_view(&self) -> Result<(), AutomationError> {
        // The simulated viewport always contains every node.
        self.with_node(|_| ())
    }

    fn set_highlight(&self, highlight: Highlight) -> Result<(), AutomationError> {
        self.with_node(|n| n.highlight = Some(highlight))
    }

    fn clear_highlight(&self) -> Result<(), AutomationError> {
        self.with_node(|n| n.highlight = None)
    }

    fn clone_box(&self) -> Box<dyn ControlImpl> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[async_trait::async_trait]
impl DomEngine for SimulatedPage {
    async fn controls(&self) -> Result<Vec<Control>, AutomationError> {
        let ids: Vec<usize> = self.lock().nodes.iter().map(|n| n.id).collect();
        Ok(ids
            .into_iter()
            .map(|id| {
                Control::new(Box::new(SimulatedControl {
                    id,
                    model: self.model.clone(),
                }))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
