//! Lifecycle and bookkeeping of one automation run.
//!
//! A session moves `Idle -> Running -> terminal` and is reset back to idle
//! defaults when it finishes, so one `Session` value serves a page context
//! for its whole lifetime. Exactly one run may be active at a time.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::element::Control;
use crate::errors::AutomationError;
use crate::markers::MarkerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// Live progress snapshot pushed to observers after every click.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub clicked_count: usize,
    pub total_buttons: usize,
    pub is_running: bool,
    pub pattern: String,
    pub original_count: usize,
    pub discovered_count: usize,
}

/// Final snapshot emitted exactly once when a session ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_clicked: usize,
    pub total_time_seconds: f64,
    pub completed: bool,
    pub pattern: String,
    pub original_buttons: usize,
    pub new_buttons_found: usize,
}

pub struct Session {
    id: Uuid,
    status: SessionStatus,
    selected_label: String,
    /// Append-only while running; entries are never removed mid-run.
    targets: Vec<Control>,
    visited: HashSet<Control>,
    clicked_count: usize,
    original_count: usize,
    discovered_count: usize,
    started_at: Option<Instant>,
    interval_seconds: f64,
    /// The armed continuation driving the next step. `Some` iff the session
    /// is running and awaiting its next iteration.
    pending: Option<JoinHandle<()>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            status: SessionStatus::Idle,
            selected_label: String::new(),
            targets: Vec::new(),
            visited: HashSet::new(),
            clicked_count: 0,
            original_count: 0,
            discovered_count: 0,
            started_at: None,
            interval_seconds: 0.0,
            pending: None,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn selected_label(&self) -> &str {
        &self.selected_label
    }

    pub fn interval_seconds(&self) -> f64 {
        self.interval_seconds
    }

    pub fn clicked_count(&self) -> usize {
        self.clicked_count
    }

    pub fn original_count(&self) -> usize {
        self.original_count
    }

    pub fn discovered_count(&self) -> usize {
        self.discovered_count
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Transition `Idle -> Running` with a fresh target list.
    ///
    /// The caller has already verified the list is non-empty; an empty-match
    /// start is rejected with `NoMatch` before the session is touched.
    pub fn begin(
        &mut self,
        label: &str,
        interval_seconds: f64,
        targets: Vec<Control>,
    ) -> Result<(), AutomationError> {
        if self.is_running() {
            return Err(AutomationError::AlreadyRunning(self.selected_label.clone()));
        }
        self.id = Uuid::new_v4();
        self.status = SessionStatus::Running;
        self.selected_label = label.to_string();
        self.original_count = targets.len();
        self.targets = targets;
        self.visited.clear();
        self.clicked_count = 0;
        self.discovered_count = 0;
        self.started_at = Some(Instant::now());
        self.interval_seconds = interval_seconds;
        info!(
            session = %self.id,
            pattern = label,
            targets = self.original_count,
            interval_seconds,
            "session started"
        );
        Ok(())
    }

    /// First target in insertion order not yet visited. Linear scan; target
    /// lists are bounded by on-page content.
    pub fn next_target(&self) -> Option<Control> {
        self.targets.iter().find(|c| !self.visited.contains(c)).cloned()
    }

    /// Record a click on `control`. Idempotent: returns `true` and bumps
    /// `clicked_count` only the first time a given control is recorded. The
    /// counted marker lives on the side table, so the guarantee holds even
    /// if the visited set were bypassed.
    pub fn record_click(&mut self, markers: &MarkerStore, control: &Control) -> bool {
        self.visited.insert(control.clone());
        let newly_counted = markers.mark_counted(control);
        if newly_counted {
            self.clicked_count += 1;
        }
        debug_assert!(self.clicked_count <= self.targets.len());
        newly_counted
    }

    /// Append controls not already present (identity comparison), tagging
    /// them as newly discovered. Returns the appended subsequence.
    pub fn merge_discovered(&mut self, markers: &MarkerStore, found: Vec<Control>) -> Vec<Control> {
        let known: HashSet<usize> = self.targets.iter().map(Control::object_id).collect();
        let mut appended = Vec::new();
        for control in found {
            if known.contains(&control.object_id()) || appended.contains(&control) {
                continue;
            }
            markers.mark_discovered(&control);
            appended.push(control.clone());
            self.targets.push(control);
        }
        self.discovered_count += appended.len();
        debug_assert_eq!(self.original_count + self.discovered_count, self.targets.len());
        if !appended.is_empty() {
            debug!(
                session = %self.id,
                appended = appended.len(),
                total = self.targets.len(),
                "merged newly discovered controls"
            );
        }
        appended
    }

    pub fn set_pending(&mut self, handle: JoinHandle<()>) {
        self.pending = Some(handle);
    }

    pub fn take_pending(&mut self) -> Option<JoinHandle<()>> {
        self.pending.take()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            clicked_count: self.clicked_count,
            total_buttons: self.targets.len(),
            is_running: self.is_running(),
            pattern: self.selected_label.clone(),
            original_count: self.original_count,
            discovered_count: self.discovered_count,
        }
    }

    /// End the run and reset to idle defaults. Returns the final snapshot,
    /// or `None` when the session was already idle (stop on idle is a
    /// no-op beyond the caller's marker cleanup).
    pub fn finish(&mut self, completed: bool) -> Option<SessionSummary> {
        if self.status != SessionStatus::Running {
            return None;
        }
        self.status = if completed {
            SessionStatus::Completed
        } else {
            SessionStatus::Stopped
        };
        let summary = SessionSummary {
            total_clicked: self.clicked_count,
            total_time_seconds: self
                .started_at
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
            completed,
            pattern: self.selected_label.clone(),
            original_buttons: self.original_count,
            new_buttons_found: self.discovered_count,
        };
        info!(
            session = %self.id,
            clicked = summary.total_clicked,
            elapsed_seconds = summary.total_time_seconds,
            completed,
            "session finished"
        );
        *self = Session::default();
        Some(summary)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("pattern", &self.selected_label)
            .field("targets", &self.targets.len())
            .field("clicked", &self.clicked_count)
            .finish()
    }
}
