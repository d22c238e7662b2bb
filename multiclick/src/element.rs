use crate::errors::AutomationError;
use crate::ClickResult;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::instrument;

/// Visual marker applied to a control while a session holds it.
///
/// `Pending` marks a control selected for clicking; `Done` marks a control
/// the session has already activated. The two must render visually distinct
/// on the host, but neither may ever affect scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Highlight {
    Pending,
    Done,
}

/// Interface for host-specific control implementations
///
/// A control is an opaque handle to one clickable element owned by the host
/// document. Identity is `object_id`, never label text: two controls can
/// share a label and remain distinct.
pub trait ControlImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    /// Raw display text as reported by the host. Callers should prefer
    /// [`Control::label`], which trims it.
    fn label(&self) -> String;
    fn is_visible(&self) -> Result<bool, AutomationError>;
    fn is_enabled(&self) -> Result<bool, AutomationError>;
    fn click(&self) -> Result<ClickResult, AutomationError>;
    fn scroll_into_view(&self) -> Result<(), AutomationError>;
    fn set_highlight(&self, highlight: Highlight) -> Result<(), AutomationError>;
    fn clear_highlight(&self) -> Result<(), AutomationError>;

    // Add a method to clone the box
    fn clone_box(&self) -> Box<dyn ControlImpl>;

    // Enable downcasting to concrete control types
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Represents one clickable control on the host page
#[derive(Debug)]
pub struct Control {
    inner: Box<dyn ControlImpl>,
}

impl Control {
    /// Create a new control from a host-specific implementation
    pub fn new(impl_: Box<dyn ControlImpl>) -> Self {
        Self { inner: impl_ }
    }

    /// Stable identity of the underlying host element.
    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    /// Trimmed display text of the control.
    pub fn label(&self) -> String {
        self.inner.label().trim().to_string()
    }

    /// Whether the host currently renders this control (non-zero box, not
    /// hidden). Errors from the host are treated as "not visible".
    pub fn is_visible(&self) -> bool {
        self.inner.is_visible().unwrap_or(false)
    }

    /// Whether the control accepts activation right now.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled().unwrap_or(false)
    }

    /// Activate this control
    #[instrument(level = "debug", skip(self))]
    pub fn click(&self) -> Result<ClickResult, AutomationError> {
        self.inner.click()
    }

    /// Scroll the control into the host viewport.
    pub fn scroll_into_view(&self) -> Result<(), AutomationError> {
        self.inner.scroll_into_view()
    }

    /// Apply a visual highlight on the host element.
    pub fn set_highlight(&self, highlight: Highlight) -> Result<(), AutomationError> {
        self.inner.set_highlight(highlight)
    }

    /// Remove any visual highlight from the host element.
    pub fn clear_highlight(&self) -> Result<(), AutomationError> {
        self.inner.clear_highlight()
    }

    /// Downcast access to the concrete host implementation.
    pub fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }
}

impl PartialEq for Control {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl Eq for Control {}

impl std::hash::Hash for Control {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.object_id().hash(state);
    }
}

impl Clone for Control {
    fn clone(&self) -> Self {
        // We can't directly clone the inner Box<dyn ControlImpl>, but we can
        // create a new Control with the same identity that will behave the
        // same way
        Self {
            inner: self.inner.clone_box(),
        }
    }
}
