//! Identity-keyed side table for transient per-control markers.
//!
//! Host element models do not reliably support attaching opaque metadata to
//! elements, so counted/newly-discovered/highlight state lives here, keyed by
//! `object_id`. The table is always fully reconstructible and clearable: a
//! session end or page unload calls [`MarkerStore::clear_all`] and every
//! tracked control loses its visual highlight as well.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::element::{Control, Highlight};

#[derive(Debug, Default, Clone, Copy)]
struct MarkerFlags {
    counted: bool,
    newly_discovered: bool,
    highlight: Option<Highlight>,
}

struct Entry {
    flags: MarkerFlags,
    // Kept so clear_all can remove the visual highlight from the host
    // element without a rescan.
    control: Control,
}

#[derive(Default)]
pub struct MarkerStore {
    inner: Mutex<HashMap<usize, Entry>>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<R>(&self, control: &Control, f: impl FnOnce(&mut MarkerFlags) -> R) -> R {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = map.entry(control.object_id()).or_insert_with(|| Entry {
            flags: MarkerFlags::default(),
            control: control.clone(),
        });
        f(&mut entry.flags)
    }

    /// Mark a control as counted. Returns `true` only the first time the
    /// marker is set, which is what makes click accounting idempotent even if
    /// the in-memory visited set is somehow bypassed.
    pub fn mark_counted(&self, control: &Control) -> bool {
        self.with_entry(control, |flags| {
            let newly = !flags.counted;
            flags.counted = true;
            newly
        })
    }

    pub fn is_counted(&self, control: &Control) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&control.object_id())
            .map(|e| e.flags.counted)
            .unwrap_or(false)
    }

    /// Tag a control appended to the target list after session start.
    pub fn mark_discovered(&self, control: &Control) {
        self.with_entry(control, |flags| flags.newly_discovered = true);
    }

    pub fn is_newly_discovered(&self, control: &Control) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&control.object_id())
            .map(|e| e.flags.newly_discovered)
            .unwrap_or(false)
    }

    /// Apply a visual highlight and record it in the table.
    pub fn highlight(
        &self,
        control: &Control,
        highlight: Highlight,
    ) -> Result<(), crate::errors::AutomationError> {
        control.set_highlight(highlight)?;
        self.with_entry(control, |flags| flags.highlight = Some(highlight));
        Ok(())
    }

    pub fn highlight_of(&self, control: &Control) -> Option<Highlight> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&control.object_id()).and_then(|e| e.flags.highlight)
    }

    /// Drop every marker and remove highlights from all tracked controls.
    /// Returns the number of controls that were tracked.
    pub fn clear_all(&self) -> usize {
        let entries: Vec<Entry> = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.drain().map(|(_, entry)| entry).collect()
        };
        let cleared = entries.len();
        for entry in entries {
            if let Err(e) = entry.control.clear_highlight() {
                // The element may already be gone from the page.
                debug!(id = entry.control.object_id(), error = %e, "could not clear highlight");
            }
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MarkerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerStore").field("len", &self.len()).finish()
    }
}
