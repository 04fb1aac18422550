//! Container geometry observation.
//!
//! Geometry events arrive from the host on their own channel and are only
//! applied when the controller drains them on its animation frame. Bursts of
//! events coalesce into at most one re-projection per frame interval. When
//! every observed container is zero-sized at once (a panel mid-transition),
//! nothing is scheduled so camera state is not corrupted.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc;
use web_time::Instant;

use crate::layout::PaneId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryEvent {
    pub pane_id: PaneId,
    pub width: u32,
    pub height: u32,
}

/// Host-side handle used to report container geometry.
#[derive(Clone, Debug)]
pub struct ResizeObserver {
    tx: mpsc::UnboundedSender<GeometryEvent>,
}

impl ResizeObserver {
    /// Report a new size. Returns false once observation has stopped.
    pub fn notify(&self, pane_id: PaneId, width: u32, height: u32) -> bool {
        self.tx
            .send(GeometryEvent {
                pane_id,
                width,
                height,
            })
            .is_ok()
    }
}

/// Panes visible when a re-projection pass fires.
#[derive(Debug, PartialEq, Eq)]
pub struct ResizePass {
    pub visible: Vec<PaneId>,
}

pub struct ResizeReconciler {
    rx: mpsc::UnboundedReceiver<GeometryEvent>,
    observed: BTreeMap<PaneId, (u32, u32)>,
    pending: bool,
    last_pass: Option<Instant>,
    frame_interval: Duration,
}

impl ResizeReconciler {
    pub fn new(frame_interval: Duration) -> (Self, ResizeObserver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reconciler = Self {
            rx,
            observed: BTreeMap::new(),
            pending: false,
            last_pass: None,
            frame_interval,
        };
        (reconciler, ResizeObserver { tx })
    }

    /// Start observing a container with its current size.
    pub fn observe(&mut self, pane_id: PaneId, width: u32, height: u32) {
        let previous = self.observed.insert(pane_id, (width, height));
        if previous != Some((width, height)) {
            self.schedule();
        }
    }

    pub fn unobserve(&mut self, pane_id: PaneId) {
        self.observed.remove(pane_id);
    }

    /// Stop all observation; the host's observer handles go dead.
    pub fn unobserve_all(&mut self) {
        self.observed.clear();
        self.pending = false;
        self.rx.close();
    }

    pub fn is_observing(&self, pane_id: &str) -> bool {
        self.observed.contains_key(pane_id)
    }

    /// Apply one geometry change. Events for unobserved panes are dropped.
    pub fn on_geometry(&mut self, event: GeometryEvent) -> bool {
        let Some(size) = self.observed.get_mut(event.pane_id) else {
            return false;
        };
        let next = (event.width, event.height);
        if *size == next {
            return false;
        }
        *size = next;
        self.schedule();
        true
    }

    fn schedule(&mut self) {
        let any_visible = self.observed.values().any(|&(w, h)| w > 0 && h > 0);
        if any_visible {
            self.pending = true;
        } else {
            if self.pending {
                tracing::debug!("all containers collapsed; dropping scheduled resize");
            }
            self.pending = false;
        }
    }

    /// Pull queued events from the host channel and apply them.
    pub fn drain(&mut self) -> Vec<GeometryEvent> {
        let mut applied = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            if self.on_geometry(event) {
                applied.push(event);
            }
        }
        applied
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Called once per animation frame. Yields a pass when a resize is
    /// scheduled and the previous pass is at least one frame old.
    pub fn poll_frame(&mut self, now: Instant) -> Option<ResizePass> {
        if !self.pending {
            return None;
        }
        if let Some(last) = self.last_pass {
            if now.saturating_duration_since(last) < self.frame_interval {
                return None;
            }
        }
        self.pending = false;
        self.last_pass = Some(now);
        let visible = self
            .observed
            .iter()
            .filter(|(_, (w, h))| *w > 0 && *h > 0)
            .map(|(id, _)| *id)
            .collect();
        Some(ResizePass { visible })
    }
}
