//! Seam to the external rendering capability.
//!
//! Rasterization, decoding and camera math live behind these traits. The
//! orchestration layer only decides which panes exist, in which mode, and what
//! data they show.

use std::sync::Arc;

use thiserror::Error;

use crate::enums::{DisplayMode, Orientation};
use crate::frame::FrameReference;
use crate::layout::PaneId;
use crate::tools::ToolBindings;
use crate::volume::VolumeHandle;

/// Supplies the bearer token for each outbound frame fetch.
pub type AuthTokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Rendering capability failed to initialize: {0}")]
    Initialization(String),

    #[error("Rendering surface has been destroyed")]
    Destroyed,

    #[error("Pane {pane_id} could not be enabled: {reason}")]
    PaneUnavailable { pane_id: PaneId, reason: String },

    #[error("Pane {0} is not enabled on the surface")]
    UnknownPane(PaneId),
}

/// Host element a pane renders into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerRegion {
    pub element_id: String,
    pub width: u32,
    pub height: u32,
}

impl ContainerRegion {
    pub fn new(element_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            element_id: element_id.into(),
            width,
            height,
        }
    }

    /// Both dimensions are non-zero.
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Everything the surface needs to enable one pane.
#[derive(Clone, Copy, Debug)]
pub struct PaneSpec<'a> {
    pub pane_id: PaneId,
    pub element_id: &'a str,
    pub width: u32,
    pub height: u32,
    pub mode: DisplayMode,
    /// Opaque transfer-function preset, only set for 3D panes.
    pub preset: Option<&'a str>,
}

/// Process-level rendering capability that can mint surfaces.
#[allow(async_fn_in_trait)]
pub trait RenderingBackend {
    type Surface: RenderingSurface;

    /// One-time setup of rendering and decoding. Must complete before any
    /// surface is created.
    async fn initialize(&self, auth: AuthTokenProvider) -> Result<(), SurfaceError>;

    async fn create_surface(&self, surface_id: &str) -> Result<Self::Surface, SurfaceError>;
}

/// A live rendering surface owning zero or more panes.
#[allow(async_fn_in_trait)]
pub trait RenderingSurface {
    async fn enable_pane(&mut self, spec: PaneSpec<'_>) -> Result<(), SurfaceError>;

    fn disable_pane(&mut self, pane_id: PaneId);

    fn set_stack(&mut self, pane_id: PaneId, frames: &[FrameReference]) -> Result<(), SurfaceError>;

    async fn set_volume(
        &mut self,
        pane_id: PaneId,
        volume: &VolumeHandle,
        orientation: Option<Orientation>,
    ) -> Result<(), SurfaceError>;

    fn render(&mut self, pane_ids: &[PaneId]);

    /// Re-project every pane to its current element size.
    fn resize(&mut self, keep_camera: bool);

    fn has_camera(&self, pane_id: PaneId) -> bool;

    /// Fit the pane's camera to its data.
    fn reset_camera(&mut self, pane_id: PaneId);

    fn apply_tools(&mut self, bindings: &ToolBindings);

    fn destroy(&mut self);
}
