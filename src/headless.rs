//! In-memory rendering backend.
//!
//! Records every call it receives so callers can inspect what the
//! orchestration layer did. Volume panes are "rendered" by reformatting the
//! centre slice along their axis on the CPU, which proves the volume actually
//! reached the pane.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::enums::{DisplayMode, Interpolation, Orientation, Processor};
use crate::frame::FrameReference;
use crate::identity::VolumeIdentity;
use crate::layout::PaneId;
use crate::surface::{AuthTokenProvider, PaneSpec, RenderingBackend, RenderingSurface, SurfaceError};
use crate::tools::ToolBindings;
use crate::volume::VolumeHandle;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceOp {
    Initialize,
    CreateSurface,
    Enable { pane: PaneId, element: String, mode: DisplayMode },
    Disable(PaneId),
    SetStack { pane: PaneId, frames: usize, authorized: bool },
    SetVolume { pane: PaneId, identity: VolumeIdentity },
    Render(PaneId),
    /// A reformatted slice was produced for a volume pane.
    Slice { pane: PaneId, width: u32, height: u32 },
    Resize { keep_camera: bool },
    ResetCamera(PaneId),
    ApplyTools { two_d: Vec<PaneId>, three_d: Vec<PaneId>, cross_pane: bool },
    Destroy,
}

/// Shared view of the operations recorded by a [`HeadlessBackend`].
#[derive(Clone, Debug, Default)]
pub struct HeadlessLog {
    ops: Rc<RefCell<Vec<SurfaceOp>>>,
}

impl HeadlessLog {
    fn push(&self, op: SurfaceOp) {
        self.ops.borrow_mut().push(op);
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.ops.borrow().clone()
    }

    pub fn count(&self, predicate: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.ops.borrow().iter().filter(|op| predicate(op)).count()
    }

    pub fn clear(&self) {
        self.ops.borrow_mut().clear();
    }
}

#[derive(Default)]
pub struct HeadlessBackend {
    log: HeadlessLog,
    fail_initialize: bool,
    auth: RefCell<Option<AuthTokenProvider>>,
    surfaces_created: Cell<usize>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose initialization always fails.
    pub fn failing() -> Self {
        Self {
            fail_initialize: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> HeadlessLog {
        self.log.clone()
    }
}

impl RenderingBackend for HeadlessBackend {
    type Surface = HeadlessSurface;

    async fn initialize(&self, auth: AuthTokenProvider) -> Result<(), SurfaceError> {
        tokio::task::yield_now().await;
        if self.fail_initialize {
            return Err(SurfaceError::Initialization(
                "no rendering context available".to_string(),
            ));
        }
        self.auth.replace(Some(auth));
        self.log.push(SurfaceOp::Initialize);
        Ok(())
    }

    async fn create_surface(&self, surface_id: &str) -> Result<HeadlessSurface, SurfaceError> {
        tokio::task::yield_now().await;
        self.surfaces_created.set(self.surfaces_created.get() + 1);
        self.log.push(SurfaceOp::CreateSurface);
        tracing::debug!(surface = surface_id, count = self.surfaces_created.get(), "headless surface");
        Ok(HeadlessSurface {
            log: self.log.clone(),
            auth: self.auth.borrow().clone(),
            panes: BTreeMap::new(),
        })
    }
}

pub struct HeadlessSurface {
    log: HeadlessLog,
    auth: Option<AuthTokenProvider>,
    panes: BTreeMap<PaneId, HeadlessPane>,
}

struct HeadlessPane {
    mode: DisplayMode,
    has_camera: bool,
    frames: usize,
    orientation: Option<Orientation>,
    volume: Option<VolumeHandle>,
}

impl HeadlessSurface {
    /// Reformat the centre slice; returns the image size.
    fn render_volume(pane: &HeadlessPane) -> Option<(u32, u32)> {
        let volume = pane.volume.as_ref()?.volume();
        let orientation = pane.orientation.unwrap_or(Orientation::Axial);
        let index = volume.slice_count(orientation) / 2;
        volume
            .get_image_from_axis(index, orientation, Interpolation::Bilinear(Processor::CPU))
            .map(|image| image.dimensions())
    }
}

impl RenderingSurface for HeadlessSurface {
    async fn enable_pane(&mut self, spec: PaneSpec<'_>) -> Result<(), SurfaceError> {
        tokio::task::yield_now().await;
        if spec.width == 0 || spec.height == 0 {
            return Err(SurfaceError::PaneUnavailable {
                pane_id: spec.pane_id,
                reason: "element has no area".to_string(),
            });
        }
        self.panes.insert(
            spec.pane_id,
            HeadlessPane {
                mode: spec.mode,
                has_camera: false,
                frames: 0,
                orientation: None,
                volume: None,
            },
        );
        self.log.push(SurfaceOp::Enable {
            pane: spec.pane_id,
            element: spec.element_id.to_string(),
            mode: spec.mode,
        });
        Ok(())
    }

    fn disable_pane(&mut self, pane_id: PaneId) {
        if self.panes.remove(pane_id).is_some() {
            self.log.push(SurfaceOp::Disable(pane_id));
        }
    }

    fn set_stack(&mut self, pane_id: PaneId, frames: &[FrameReference]) -> Result<(), SurfaceError> {
        let pane = self
            .panes
            .get_mut(pane_id)
            .ok_or(SurfaceError::UnknownPane(pane_id))?;
        pane.frames = frames.len();
        // The decode layer asks for a token per fetch; only the first frame is
        // fetched eagerly.
        let authorized = !frames.is_empty()
            && self.auth.as_ref().and_then(|auth| auth()).is_some();
        self.log.push(SurfaceOp::SetStack {
            pane: pane_id,
            frames: frames.len(),
            authorized,
        });
        Ok(())
    }

    async fn set_volume(
        &mut self,
        pane_id: PaneId,
        volume: &VolumeHandle,
        orientation: Option<Orientation>,
    ) -> Result<(), SurfaceError> {
        tokio::task::yield_now().await;
        let pane = self
            .panes
            .get_mut(pane_id)
            .ok_or(SurfaceError::UnknownPane(pane_id))?;
        pane.frames = volume.identity().frame_count();
        pane.orientation = orientation;
        pane.volume = Some(volume.clone());
        self.log.push(SurfaceOp::SetVolume {
            pane: pane_id,
            identity: volume.identity(),
        });
        Ok(())
    }

    fn render(&mut self, pane_ids: &[PaneId]) {
        for &pane_id in pane_ids {
            let Some(pane) = self.panes.get_mut(pane_id) else {
                continue;
            };
            if pane.mode == DisplayMode::Volume {
                if let Some((width, height)) = Self::render_volume(pane) {
                    self.log.push(SurfaceOp::Slice {
                        pane: pane_id,
                        width,
                        height,
                    });
                }
            }
            pane.has_camera |= pane.frames > 0;
            self.log.push(SurfaceOp::Render(pane_id));
        }
    }

    fn resize(&mut self, keep_camera: bool) {
        if !keep_camera {
            for pane in self.panes.values_mut() {
                pane.has_camera = false;
            }
        }
        self.log.push(SurfaceOp::Resize { keep_camera });
    }

    fn has_camera(&self, pane_id: PaneId) -> bool {
        self.panes
            .get(pane_id)
            .is_some_and(|pane| pane.has_camera)
    }

    fn reset_camera(&mut self, pane_id: PaneId) {
        if let Some(pane) = self.panes.get_mut(pane_id) {
            pane.has_camera = true;
            self.log.push(SurfaceOp::ResetCamera(pane_id));
        }
    }

    fn apply_tools(&mut self, bindings: &ToolBindings) {
        self.log.push(SurfaceOp::ApplyTools {
            two_d: bindings.two_d.panes.iter().copied().collect(),
            three_d: bindings.three_d.panes.iter().copied().collect(),
            cross_pane: bindings.cross_pane_enabled(),
        });
    }

    fn destroy(&mut self) {
        self.panes.clear();
        self.log.push(SurfaceOp::Destroy);
    }
}
