use crate::element::Control;
use crate::errors::AutomationError;

/// The common trait that all host-document integrations must implement
///
/// The engine never owns controls; it hands out handles to elements that
/// remain owned by the host document. Controls are returned in document
/// order and unfiltered — eligibility filtering is the discovery layer's
/// job.
#[async_trait::async_trait]
pub trait DomEngine: Send + Sync {
    /// All candidate clickable controls currently in the document.
    async fn controls(&self) -> Result<Vec<Control>, AutomationError>;

    /// Diagnostic name for logs.
    fn name(&self) -> &str;
}

pub mod simulated;
