//! Ownership of the rendering surface and its panes.
//!
//! The lifecycle manager is the only source of truth for which panes exist
//! and in which mode. It never asks the surface what a pane is; a pane whose
//! container or mode changes is disabled and enabled again.

use std::collections::{BTreeMap, BTreeSet};

use crate::enums::{DisplayMode, Orientation};
use crate::frame::FrameReference;
use crate::layout::{PaneDefinition, PaneId};
use crate::liveness::LiveToken;
use crate::surface::{ContainerRegion, PaneSpec, RenderingBackend, RenderingSurface, SurfaceError};
use crate::tools::ToolBindings;
use crate::volume::VolumeHandle;

/// How a live pane is bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaneBinding {
    pub element_id: String,
    pub mode: DisplayMode,
    pub orientation: Option<Orientation>,
}

/// What one reconciliation pass changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<PaneId>,
    pub destroyed: Vec<PaneId>,
    /// Panes whose container was not ready; retried on the next pass.
    pub skipped: Vec<PaneId>,
    /// The pass stopped early because its sequence was superseded.
    pub aborted: bool,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.destroyed.is_empty()
    }
}

pub struct SurfaceLifecycle<B: RenderingBackend> {
    backend: B,
    surface_id: String,
    volume_preset: String,
    surface: Option<B::Surface>,
    bindings: BTreeMap<PaneId, PaneBinding>,
    pending: BTreeSet<PaneId>,
    /// Tool bindings last pushed to the surface.
    applied_tools: Option<ToolBindings>,
    destroyed: bool,
}

impl<B: RenderingBackend> SurfaceLifecycle<B> {
    pub fn new(backend: B, surface_id: impl Into<String>, volume_preset: impl Into<String>) -> Self {
        Self {
            backend,
            surface_id: surface_id.into(),
            volume_preset: volume_preset.into(),
            surface: None,
            bindings: BTreeMap::new(),
            pending: BTreeSet::new(),
            applied_tools: None,
            destroyed: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Return the surface, creating it on first use.
    pub async fn ensure_surface(&mut self) -> Result<&mut B::Surface, SurfaceError> {
        if self.destroyed {
            return Err(SurfaceError::Destroyed);
        }
        if self.surface.is_none() {
            let surface = self.backend.create_surface(&self.surface_id).await?;
            tracing::info!(surface = %self.surface_id, "rendering surface created");
            self.surface = Some(surface);
        }
        self.surface.as_mut().ok_or(SurfaceError::Destroyed)
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// Make the live panes match `active`.
    ///
    /// Panes no longer listed are released. Listed panes are created when
    /// missing and recreated when their container element or mode changed.
    /// Panes whose container is not mounted, or has no area yet, are skipped
    /// and reported as pending. Calling this again with the same inputs
    /// changes nothing.
    pub async fn reconcile_panes<M, C>(
        &mut self,
        active: &[PaneDefinition],
        mode_of: M,
        container_for: C,
        token: &LiveToken,
    ) -> Result<ReconcileReport, SurfaceError>
    where
        M: Fn(&PaneDefinition) -> DisplayMode,
        C: Fn(PaneId) -> Option<ContainerRegion>,
    {
        let mut report = ReconcileReport::default();
        let preset = self.volume_preset.clone();
        self.ensure_surface().await?;
        if !token.is_live() {
            report.aborted = true;
            return Ok(report);
        }

        let stale: Vec<PaneId> = self
            .bindings
            .keys()
            .filter(|id| !active.iter().any(|def| def.pane_id == **id))
            .copied()
            .collect();
        for pane_id in stale {
            self.release(pane_id);
            report.destroyed.push(pane_id);
        }
        self.pending.retain(|id| active.iter().any(|def| def.pane_id == *id));

        for def in active {
            let pane_id = def.pane_id;
            let mode = mode_of(def);
            let region = container_for(pane_id);

            let Some(region) = region else {
                if self.bindings.contains_key(pane_id) {
                    // Container went away under a live pane.
                    self.release(pane_id);
                    report.destroyed.push(pane_id);
                }
                self.pending.insert(pane_id);
                report.skipped.push(pane_id);
                continue;
            };

            if let Some(binding) = self.bindings.get_mut(pane_id) {
                if binding.element_id == region.element_id && binding.mode == mode {
                    binding.orientation = def.orientation;
                    continue;
                }
                tracing::debug!(
                    pane = pane_id,
                    from = %binding.mode,
                    to = %mode,
                    "pane binding changed; recreating"
                );
                self.release(pane_id);
                report.destroyed.push(pane_id);
            }

            if !region.has_area() {
                self.pending.insert(pane_id);
                report.skipped.push(pane_id);
                continue;
            }

            if !token.is_live() {
                report.aborted = true;
                return Ok(report);
            }
            let spec = PaneSpec {
                pane_id,
                element_id: &region.element_id,
                width: region.width,
                height: region.height,
                mode,
                preset: (mode == DisplayMode::Volume3d).then_some(preset.as_str()),
            };
            let surface = self.ensure_surface().await?;
            let enabled = surface.enable_pane(spec).await;
            match enabled {
                Ok(()) => {
                    tracing::debug!(pane = pane_id, %mode, "pane enabled");
                    self.bindings.insert(
                        pane_id,
                        PaneBinding {
                            element_id: region.element_id.clone(),
                            mode,
                            orientation: def.orientation,
                        },
                    );
                    self.pending.remove(pane_id);
                    report.created.push(pane_id);
                }
                Err(err) => {
                    tracing::warn!(pane = pane_id, error = %err, "pane could not be enabled");
                    self.pending.insert(pane_id);
                    report.skipped.push(pane_id);
                }
            }
        }

        if !report.is_noop() && token.is_live() {
            if let Some(surface) = self.surface.as_mut() {
                surface.resize(true);
            }
        }
        Ok(report)
    }

    fn release(&mut self, pane_id: PaneId) {
        if let Some(surface) = self.surface.as_mut() {
            // Tools stop targeting the pane before it goes away.
            if let Some(applied) = self.applied_tools.as_mut() {
                if applied.remove_pane(pane_id) {
                    surface.apply_tools(applied);
                }
            }
            surface.disable_pane(pane_id);
        }
        self.bindings.remove(pane_id);
        tracing::debug!(pane = pane_id, "pane released");
    }

    /// Push frames into a stack pane and render it.
    ///
    /// Assigning to a pane that is not bound in stack mode is a logged no-op;
    /// this happens when teardown races with assignment.
    pub fn assign_stack(&mut self, pane_id: PaneId, frames: &[FrameReference]) -> bool {
        let Some(surface) = self.bound_surface(pane_id, |mode| mode == DisplayMode::Stack) else {
            return false;
        };
        match surface.set_stack(pane_id, frames) {
            Ok(()) => {
                surface.render(&[pane_id]);
                true
            }
            Err(err) => {
                tracing::warn!(pane = pane_id, error = %err, "stack assignment failed");
                false
            }
        }
    }

    /// Push a volume into a volumetric pane and render it.
    pub async fn assign_volume(
        &mut self,
        pane_id: PaneId,
        volume: &VolumeHandle,
        orientation: Option<Orientation>,
    ) -> bool {
        let Some(surface) = self.bound_surface(pane_id, DisplayMode::is_volumetric) else {
            return false;
        };
        match surface.set_volume(pane_id, volume, orientation).await {
            Ok(()) => {
                surface.render(&[pane_id]);
                true
            }
            Err(err) => {
                tracing::warn!(pane = pane_id, error = %err, "volume assignment failed");
                false
            }
        }
    }

    fn bound_surface(
        &mut self,
        pane_id: PaneId,
        accepts: impl Fn(DisplayMode) -> bool,
    ) -> Option<&mut B::Surface> {
        let Some(binding) = self.bindings.get(pane_id) else {
            tracing::warn!(pane = pane_id, "assignment to a pane that is not enabled");
            return None;
        };
        if !accepts(binding.mode) {
            tracing::warn!(pane = pane_id, mode = %binding.mode, "assignment does not match pane mode");
            return None;
        }
        self.surface.as_mut()
    }

    /// Resize keeping cameras, then fit panes that never had one.
    /// Returns the panes whose camera was reset.
    pub fn reproject(&mut self) -> Vec<PaneId> {
        let Some(surface) = self.surface.as_mut() else {
            return Vec::new();
        };
        surface.resize(true);
        let fresh: Vec<PaneId> = self
            .bindings
            .keys()
            .copied()
            .filter(|id| !surface.has_camera(*id))
            .collect();
        for &pane_id in &fresh {
            surface.reset_camera(pane_id);
        }
        let all: Vec<PaneId> = self.bindings.keys().copied().collect();
        surface.render(&all);
        fresh
    }

    pub fn apply_tools(&mut self, bindings: &ToolBindings) {
        if let Some(surface) = self.surface.as_mut() {
            surface.apply_tools(bindings);
            self.applied_tools = Some(bindings.clone());
        }
    }

    /// Disable every pane and release the surface. Only the first call acts.
    pub fn destroy_surface(&mut self) {
        if self.destroyed {
            tracing::warn!(surface = %self.surface_id, "surface already destroyed");
            return;
        }
        if let (Some(surface), Some(mut applied)) = (self.surface.as_mut(), self.applied_tools.take()) {
            if applied.clear_panes() {
                surface.apply_tools(&applied);
            }
        }
        let panes: Vec<PaneId> = self.bindings.keys().copied().collect();
        for pane_id in panes {
            self.release(pane_id);
        }
        self.pending.clear();
        if let Some(mut surface) = self.surface.take() {
            surface.destroy();
        }
        self.destroyed = true;
        tracing::info!(surface = %self.surface_id, "rendering surface destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn binding(&self, pane_id: &str) -> Option<&PaneBinding> {
        self.bindings.get(pane_id)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (PaneId, &PaneBinding)> {
        self.bindings.iter().map(|(id, binding)| (*id, binding))
    }

    /// Panes currently enabled on the surface.
    pub fn bound_pane_ids(&self) -> Vec<PaneId> {
        self.bindings.keys().copied().collect()
    }

    /// Whether some active pane is waiting for its container.
    pub fn has_pending_panes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Active panes not yet enabled.
    pub fn pending_pane_ids(&self) -> impl Iterator<Item = PaneId> + '_ {
        self.pending.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessBackend, SurfaceOp};
    use crate::layout::{LayoutId, layout};
    use crate::pane_mode::resolve_mode;
    use crate::tools::{Tool, ToolCoordinator};
    use ndarray::Array3;
    use std::collections::HashMap;

    fn regions(ids: &[PaneId]) -> HashMap<PaneId, ContainerRegion> {
        ids.iter()
            .map(|id| (*id, ContainerRegion::new(format!("viewport-{id}"), 256, 256)))
            .collect()
    }

    fn lifecycle() -> (SurfaceLifecycle<HeadlessBackend>, crate::headless::HeadlessLog) {
        let backend = HeadlessBackend::new();
        let log = backend.log();
        (SurfaceLifecycle::new(backend, "test", "CT-Bone"), log)
    }

    #[tokio::test]
    async fn ensure_surface_is_idempotent() {
        let (mut lifecycle, log) = lifecycle();
        lifecycle.ensure_surface().await.unwrap();
        lifecycle.ensure_surface().await.unwrap();
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::CreateSurface)), 1);
    }

    #[tokio::test]
    async fn second_identical_pass_is_a_noop() {
        let (mut lifecycle, log) = lifecycle();
        let def = layout(LayoutId::Orthogonal);
        let containers = regions(&["axial", "sagittal", "coronal"]);
        let token = LiveToken::new(1);

        let first = lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 40), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();
        assert_eq!(first.created.len(), 3);

        let enables_before = log.count(|op| matches!(op, SurfaceOp::Enable { .. }));
        let second = lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 40), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();

        assert!(second.is_noop());
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::Enable { .. })), enables_before);
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::Disable(_))), 0);
    }

    #[tokio::test]
    async fn unmounted_and_empty_containers_are_skipped_then_retried() {
        let (mut lifecycle, _log) = lifecycle();
        let def = layout(LayoutId::Orthogonal);
        let mut containers = regions(&["axial"]);
        containers.insert("sagittal", ContainerRegion::new("viewport-sagittal", 0, 300));
        let token = LiveToken::new(1);

        let report = lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 40), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();
        assert_eq!(report.created, vec!["axial"]);
        assert_eq!(report.skipped, vec!["sagittal", "coronal"]);
        assert!(lifecycle.has_pending_panes());

        let containers = regions(&["axial", "sagittal", "coronal"]);
        let report = lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 40), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();
        assert_eq!(report.created, vec!["sagittal", "coronal"]);
        assert!(!lifecycle.has_pending_panes());
    }

    #[tokio::test]
    async fn mode_change_recreates_the_pane() {
        let (mut lifecycle, _log) = lifecycle();
        let def = layout(LayoutId::Single);
        let containers = regions(&["single"]);
        let token = LiveToken::new(1);

        lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 1), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();
        assert_eq!(lifecycle.binding("single").map(|b| b.mode), Some(DisplayMode::Stack));

        let report = lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 10), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();
        assert_eq!(report.destroyed, vec!["single"]);
        assert_eq!(report.created, vec!["single"]);
        assert_eq!(lifecycle.binding("single").map(|b| b.mode), Some(DisplayMode::Volume));
    }

    #[tokio::test]
    async fn superseded_pass_creates_nothing() {
        let (mut lifecycle, log) = lifecycle();
        let def = layout(LayoutId::Orthogonal);
        let containers = regions(&["axial", "sagittal", "coronal"]);
        let token = LiveToken::new(1);
        token.supersede();

        let report = lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 40), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();
        assert!(report.aborted);
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::Enable { .. })), 0);
    }

    #[tokio::test]
    async fn assignment_to_missing_or_mismatched_pane_is_a_noop() {
        let (mut lifecycle, log) = lifecycle();
        let def = layout(LayoutId::Single);
        let containers = regions(&["single"]);
        let token = LiveToken::new(1);
        lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 4), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();

        let frames = vec![FrameReference::new("dicomfile:/a/1.dcm")];
        assert!(!lifecycle.assign_stack("axial", &frames));
        // "single" is a volume pane with four frames
        assert!(!lifecycle.assign_stack("single", &frames));

        let handle = VolumeHandle::new(
            crate::identity::VolumeIdentity::of(&frames),
            crate::volume::Volume::new(Array3::zeros((4, 4, 4)), (1.0, 1.0, 1.0)),
        );
        assert!(lifecycle.assign_volume("single", &handle, Some(Orientation::Axial)).await);
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::SetStack { .. })), 0);
    }

    #[tokio::test]
    async fn released_panes_leave_the_tool_bindings_first() {
        let (mut lifecycle, log) = lifecycle();
        let token = LiveToken::new(1);
        let containers = regions(&["axial", "sagittal", "coronal", "single"]);
        let orthogonal = layout(LayoutId::Orthogonal);
        lifecycle
            .reconcile_panes(orthogonal.panes, |p| resolve_mode(p, 40), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();
        let mut tools = ToolCoordinator::new(Tool::WindowLevel);
        let bound = lifecycle.bound_pane_ids();
        lifecycle.apply_tools(tools.attach(&bound, orthogonal));

        let single = layout(LayoutId::Single);
        lifecycle
            .reconcile_panes(single.panes, |p| resolve_mode(p, 40), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();

        let ops = log.ops();
        for (index, op) in ops.iter().enumerate() {
            let SurfaceOp::Disable(pane) = op else {
                continue;
            };
            let still_bound = ops[index..].iter().any(|later| match later {
                SurfaceOp::ApplyTools { two_d, three_d, .. } => two_d.contains(pane) || three_d.contains(pane),
                _ => false,
            });
            assert!(!still_bound, "{pane} bound to tools after its removal");
        }
        assert!(matches!(
            ops.iter().rev().find(|op| matches!(op, SurfaceOp::ApplyTools { .. })),
            Some(SurfaceOp::ApplyTools { two_d, three_d, .. }) if two_d.is_empty() && three_d.is_empty()
        ));
    }

    #[tokio::test]
    async fn destroy_runs_once_and_blocks_recreation() {
        let (mut lifecycle, log) = lifecycle();
        let def = layout(LayoutId::Single);
        let containers = regions(&["single"]);
        let token = LiveToken::new(1);
        lifecycle
            .reconcile_panes(def.panes, |p| resolve_mode(p, 4), |id| containers.get(id).cloned(), &token)
            .await
            .unwrap();

        lifecycle.destroy_surface();
        lifecycle.destroy_surface();

        assert_eq!(log.count(|op| matches!(op, SurfaceOp::Destroy)), 1);
        assert!(lifecycle.bound_pane_ids().is_empty());
        assert!(matches!(
            lifecycle.ensure_surface().await,
            Err(SurfaceError::Destroyed)
        ));
    }
}
