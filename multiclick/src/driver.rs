//! The asynchronous step loop driving one automation session.
//!
//! Steps run strictly sequentially: the next step is armed only after the
//! previous one's click action and bookkeeping complete, so no two mutators
//! of the session ever run concurrently. Every await is a cancellation
//! checkpoint — a continuation that fires after `stop()` observes the
//! session is no longer running and exits without touching anything.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::api::AutomationEvent;
use crate::config::{DEFAULT_INTERVAL_SECONDS, MIN_INTERVAL_SECONDS};
use crate::discovery::Discovery;
use crate::element::{Control, Highlight};
use crate::errors::AutomationError;
use crate::host::DomEngine;
use crate::markers::MarkerStore;
use crate::session::{Progress, Session};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Timing knobs for the step loop. The defaults are the production values;
/// tests construct millisecond-scale variants.
#[derive(Debug, Clone)]
pub struct DriverTiming {
    /// Wait after scrolling a target into view, before clicking it.
    pub settle: Duration,
    /// Wait before the final grace rescan once the target list is exhausted.
    pub grace: Duration,
    /// Floor for the configured base interval, in seconds.
    pub min_interval: f64,
    /// Base interval when none is configured, in seconds.
    pub default_interval: f64,
    /// Width of the uniform jitter window added to the base interval, in
    /// seconds.
    pub jitter_window: f64,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            grace: Duration::from_secs(1),
            min_interval: MIN_INTERVAL_SECONDS,
            default_interval: DEFAULT_INTERVAL_SECONDS,
            jitter_window: 5.0,
        }
    }
}

impl DriverTiming {
    /// Resolve a requested base interval: default when absent or unusable,
    /// floored at `min_interval`.
    pub fn resolve_interval(&self, requested: Option<f64>) -> f64 {
        match requested {
            Some(s) if s.is_finite() && s > 0.0 => s.max(self.min_interval),
            _ => self.default_interval,
        }
    }
}

/// Inter-click delay: uniform in `[base, base + jitter_window]` seconds.
///
/// The original implementation computed this value, logged it, and then
/// returned a constant 500 ms — making the configured interval inert. The
/// randomized window is the contract here; the constant override was a bug.
pub(crate) fn jittered_delay(base_seconds: f64, timing: &DriverTiming) -> Duration {
    let base = timing.resolve_interval(Some(base_seconds));
    let jitter = if timing.jitter_window > 0.0 {
        rand::thread_rng().gen_range(0.0..=timing.jitter_window)
    } else {
        0.0
    };
    Duration::from_secs_f64(base + jitter)
}

struct DriverInner {
    engine: Arc<dyn DomEngine>,
    discovery: Discovery,
    markers: Arc<MarkerStore>,
    session: Arc<Mutex<Session>>,
    events: broadcast::Sender<AutomationEvent>,
    timing: DriverTiming,
    smooth_scroll: bool,
}

impl Drop for DriverInner {
    fn drop(&mut self) {
        // Page teardown: force-stop a still-armed continuation. Marker
        // cleanup happens in stop()/finalize on the normal paths.
        if let Ok(mut session) = self.session.try_lock() {
            if let Some(handle) = session.take_pending() {
                handle.abort();
            }
        }
    }
}

/// Drives sessions for one page context.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

/// The clones of shared state a spawned step loop runs against. Kept apart
/// from `Driver` so the loop task does not keep the driver itself alive
/// after the owning page is dropped.
#[derive(Clone)]
struct StepLoop {
    discovery: Discovery,
    markers: Arc<MarkerStore>,
    session: Arc<Mutex<Session>>,
    events: broadcast::Sender<AutomationEvent>,
    timing: DriverTiming,
    smooth_scroll: bool,
}

impl Driver {
    pub fn new(engine: Arc<dyn DomEngine>, timing: DriverTiming, smooth_scroll: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(DriverInner {
                discovery: Discovery::new(engine.clone()),
                engine,
                markers: Arc::new(MarkerStore::new()),
                session: Arc::new(Mutex::new(Session::new())),
                events,
                timing,
                smooth_scroll,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.inner.events.subscribe()
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.inner.markers
    }

    pub async fn is_running(&self) -> bool {
        self.inner.session.lock().await.is_running()
    }

    pub async fn progress(&self) -> Progress {
        self.inner.session.lock().await.progress()
    }

    /// Start a session over every control currently matching `label`.
    ///
    /// Rejects with `AlreadyRunning` while a session is active (its counters
    /// are left untouched) and with `NoMatch` when the label matches nothing
    /// (the session stays idle and stray highlights are cleared).
    #[instrument(level = "debug", skip(self))]
    pub async fn start(
        &self,
        label: &str,
        interval_seconds: Option<f64>,
    ) -> Result<usize, AutomationError> {
        if label.trim().is_empty() {
            return Err(AutomationError::InvalidArgument(
                "pattern must be non-empty".to_string(),
            ));
        }
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        if session.is_running() {
            warn!(
                pattern = label,
                active = session.selected_label(),
                "start rejected, session already running"
            );
            return Err(AutomationError::AlreadyRunning(
                session.selected_label().to_string(),
            ));
        }

        let targets = inner.discovery.find_by_label(label).await?;
        // A highlight preview may have left markers on unrelated controls.
        inner.markers.clear_all();
        if targets.is_empty() {
            return Err(AutomationError::NoMatch(label.to_string()));
        }

        for target in &targets {
            if let Err(e) = inner.markers.highlight(target, Highlight::Pending) {
                debug!(id = target.object_id(), error = %e, "could not highlight target");
            }
        }

        let interval = inner.timing.resolve_interval(interval_seconds);
        let total = targets.len();
        session.begin(label, interval, targets)?;

        let step_loop = StepLoop {
            discovery: inner.discovery.clone(),
            markers: inner.markers.clone(),
            session: inner.session.clone(),
            events: inner.events.clone(),
            timing: inner.timing.clone(),
            smooth_scroll: inner.smooth_scroll,
        };
        session.set_pending(tokio::spawn(step_loop.run()));
        info!(
            host = inner.engine.name(),
            pattern = label,
            total,
            interval_seconds = interval,
            "automation started"
        );
        Ok(total)
    }

    /// Stop the active session, emitting the final snapshot with
    /// `completed == false`. Safe on an idle session: still clears any stray
    /// transient markers.
    #[instrument(level = "debug", skip(self))]
    pub async fn stop(&self) -> Result<(), AutomationError> {
        let (summary, pending) = {
            let mut session = self.inner.session.lock().await;
            let pending = session.take_pending();
            (session.finish(false), pending)
        };
        if let Some(handle) = pending {
            handle.abort();
        }
        let cleared = self.inner.markers.clear_all();
        match summary {
            Some(summary) => {
                let _ = self.inner.events.send(AutomationEvent::complete(summary));
            }
            None => debug!(cleared, "stop on idle session, markers cleared"),
        }
        Ok(())
    }
}

impl StepLoop {
    async fn run(self) {
        loop {
            let (target, label, interval) = {
                let session = self.session.lock().await;
                if !session.is_running() {
                    // Stale continuation after stop.
                    return;
                }
                (
                    session.next_target(),
                    session.selected_label().to_string(),
                    session.interval_seconds(),
                )
            };

            let target = match target {
                Some(target) => target,
                None => match self.refill(&label).await {
                    Some(target) => target,
                    // Session was finalized (or stopped) inside refill.
                    None => return,
                },
            };

            self.click_action(&target, &label).await;

            let progress = {
                let mut session = self.session.lock().await;
                if !session.is_running() {
                    return;
                }
                session.record_click(&self.markers, &target);
                session.progress()
            };
            let _ = self.events.send(AutomationEvent::progress(progress));

            let delay = jittered_delay(interval, &self.timing);
            debug!(delay_seconds = delay.as_secs_f64(), "arming next step");
            sleep(delay).await;
        }
    }

    /// Bring the target into view, wait for layout to settle, activate it,
    /// and mark it done. Activation failures are logged, never fatal: the
    /// page may legitimately ignore a click.
    async fn click_action(&self, target: &Control, label: &str) {
        if self.smooth_scroll {
            if let Err(e) = target.scroll_into_view() {
                debug!(id = target.object_id(), error = %e, "scroll into view failed");
            }
        }
        sleep(self.timing.settle).await;
        if !self.session.lock().await.is_running() {
            return;
        }
        match target.click() {
            Ok(result) => debug!(
                id = target.object_id(),
                pattern = label,
                method = %result.method,
                "control activated"
            ),
            Err(e) => warn!(
                id = target.object_id(),
                pattern = label,
                error = %e,
                "activation rejected, continuing"
            ),
        }
        if let Err(e) = self.markers.highlight(target, Highlight::Done) {
            debug!(id = target.object_id(), error = %e, "could not mark done");
        }
    }

    /// The target list is exhausted: rescan for controls appended since the
    /// last pass (infinite scroll), and if that finds nothing, give the page
    /// one final grace rescan before declaring completion.
    async fn refill(&self, label: &str) -> Option<Control> {
        if let Some(target) = self.rescan(label).await {
            return Some(target);
        }

        debug!(pattern = label, "target list exhausted, grace rescan armed");
        sleep(self.timing.grace).await;
        if !self.session.lock().await.is_running() {
            return None;
        }
        if let Some(target) = self.rescan(label).await {
            return Some(target);
        }

        self.finalize().await;
        None
    }

    /// One rescan-and-merge pass. Returns the first newly appended control.
    async fn rescan(&self, label: &str) -> Option<Control> {
        let found = match self.discovery.find_by_label(label).await {
            Ok(found) => found,
            Err(e) => {
                warn!(pattern = label, error = %e, "rescan failed, treating as no matches");
                Vec::new()
            }
        };
        let appended = {
            let mut session = self.session.lock().await;
            if !session.is_running() {
                return None;
            }
            session.merge_discovered(&self.markers, found)
        };
        for control in &appended {
            if let Err(e) = self.markers.highlight(control, Highlight::Pending) {
                debug!(id = control.object_id(), error = %e, "could not highlight discovery");
            }
        }
        appended.into_iter().next()
    }

    async fn finalize(&self) {
        let summary = {
            let mut session = self.session.lock().await;
            let _ = session.take_pending();
            session.finish(true)
        };
        let cleared = self.markers.clear_all();
        if let Some(summary) = summary {
            info!(
                pattern = %summary.pattern,
                clicked = summary.total_clicked,
                discovered = summary.new_buttons_found,
                cleared,
                "automation completed"
            );
            let _ = self.events.send(AutomationEvent::complete(summary));
        }
    }
}
