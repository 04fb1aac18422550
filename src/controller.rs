//! Viewer controller: sequences the engine in response to host triggers.
//!
//! Three triggers drive the viewer: initialization, layout selection and a new
//! frame list. Each one starts a new epoch and supersedes the sequence that
//! was running. A sequence holds the engine lock while it touches panes,
//! releases it while the volume loads, and checks its [`LiveToken`] before
//! every side effect so a superseded sequence simply stops.
//!
//! All methods take `&self` and are meant to run on one cooperative thread;
//! overlapping calls are interleaved at their `.await` points.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use tokio::sync::Mutex;
use tracing::Instrument;
use web_time::Instant;

use crate::cache::{CacheStats, VolumeCache};
use crate::config::ViewerConfig;
use crate::enums::{DisplayMode, Orientation};
use crate::error::{Result, ViewerError};
use crate::frame::FrameReference;
use crate::identity::VolumeIdentity;
use crate::layout::{GridShape, LayoutId, PaneId, layout};
use crate::lifecycle::{PaneBinding, SurfaceLifecycle};
use crate::liveness::LiveToken;
use crate::pane_mode::resolve_mode;
use crate::resize::{ResizeObserver, ResizeReconciler};
use crate::source::VolumeSource;
use crate::surface::{AuthTokenProvider, ContainerRegion, RenderingBackend};
use crate::tools::{Tool, ToolCoordinator};

const SURFACE_ID: &str = "dicom-viewport";

/// Container element id the host must provide for a pane.
pub fn element_id(pane_id: PaneId) -> String {
    format!("viewport-{pane_id}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewerState {
    Uninitialized,
    SurfaceReady,
    PanesReconciling,
    PanesReady,
    DataAssigning,
    Interactive,
    /// The rendering capability could not be brought up.
    SetupFailed,
    /// The last volume load failed; `retry` re-attempts it.
    LoadFailed,
    Unmounted,
}

impl ViewerState {
    /// Whether the transition table allows moving to `next`.
    pub fn can_transition_to(self, next: ViewerState) -> bool {
        use ViewerState::*;
        if next == Unmounted {
            return self != Unmounted;
        }
        match self {
            Uninitialized => matches!(next, SurfaceReady | SetupFailed),
            SetupFailed => matches!(next, SurfaceReady | SetupFailed),
            SurfaceReady => next == PanesReconciling,
            PanesReconciling => matches!(next, PanesReady | PanesReconciling),
            PanesReady => matches!(next, DataAssigning | Interactive | PanesReconciling),
            DataAssigning => matches!(next, Interactive | LoadFailed | PanesReconciling),
            Interactive | LoadFailed => next == PanesReconciling,
            Unmounted => false,
        }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, ViewerState::SetupFailed | ViewerState::LoadFailed)
    }
}

/// One container slot of the embeddable region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaneSlot {
    pub pane_id: PaneId,
    pub element_id: String,
    pub row: u16,
    pub col: u16,
}

/// What the host must render so panes have somewhere to live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbedLayout {
    pub layout_id: LayoutId,
    pub grid: GridShape,
    pub slots: Vec<PaneSlot>,
}

/// Toolbar-facing view of the viewer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolbarState {
    pub layout_id: LayoutId,
    pub tools: Vec<Tool>,
    pub active_tool: Tool,
}

/// Which panes a reconciliation pushes data into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Assign {
    All,
    /// Only panes the pass created; the others already show the data.
    Created,
}

struct Inputs {
    layout: LayoutId,
    frames: Rc<[FrameReference]>,
}

pub struct ViewerController<B: RenderingBackend, S: VolumeSource> {
    engine: Mutex<SurfaceLifecycle<B>>,
    source: S,
    cache: VolumeCache,
    tools: RefCell<ToolCoordinator>,
    state: Cell<ViewerState>,
    inputs: RefCell<Inputs>,
    containers: RefCell<BTreeMap<PaneId, ContainerRegion>>,
    containers_dirty: Cell<bool>,
    resize: RefCell<ResizeReconciler>,
    observer: ResizeObserver,
    auth: RefCell<Option<AuthTokenProvider>>,
    initialized: Cell<bool>,
    live: RefCell<LiveToken>,
    epoch: Cell<u64>,
}

impl<B: RenderingBackend, S: VolumeSource> ViewerController<B, S> {
    pub fn new(backend: B, source: S, config: &ViewerConfig) -> Self {
        let (resize, observer) = ResizeReconciler::new(config.frame_interval());
        Self {
            engine: Mutex::new(SurfaceLifecycle::new(backend, SURFACE_ID, config.volume_preset.clone())),
            source,
            cache: VolumeCache::new(),
            tools: RefCell::new(ToolCoordinator::new(config.default_tool)),
            state: Cell::new(ViewerState::Uninitialized),
            inputs: RefCell::new(Inputs {
                layout: config.default_layout,
                frames: Rc::from(Vec::new()),
            }),
            containers: RefCell::new(BTreeMap::new()),
            containers_dirty: Cell::new(false),
            resize: RefCell::new(resize),
            observer,
            auth: RefCell::new(None),
            initialized: Cell::new(false),
            live: RefCell::new(LiveToken::new(0)),
            epoch: Cell::new(0),
        }
    }

    /// Bring up the rendering capability and the surface, then show the
    /// current inputs. Calling it again after success does nothing.
    pub async fn initialize(&self, auth: AuthTokenProvider) -> Result<()> {
        self.ensure_mounted()?;
        if self.initialized.get() {
            return Ok(());
        }
        self.auth.replace(Some(auth.clone()));
        self.bring_up(auth).await
    }

    async fn bring_up(&self, auth: AuthTokenProvider) -> Result<()> {
        {
            let mut engine = self.engine.lock().await;
            // Another caller may have finished setup while we waited.
            if self.initialized.get() {
                return Ok(());
            }
            self.ensure_mounted()?;
            let setup = async {
                engine.backend().initialize(auth).await?;
                engine.ensure_surface().await.map(|_| ())
            }
            .await;
            if let Err(err) = setup {
                tracing::error!(error = %err, "viewer setup failed");
                self.transition(ViewerState::SetupFailed)?;
                return Err(ViewerError::Setup(err));
            }
            self.initialized.set(true);
            self.transition(ViewerState::SurfaceReady)?;
        }
        let token = self.begin();
        self.run(token, Assign::All).await
    }

    /// Switch to another layout, keeping panes the two layouts share.
    pub async fn select_layout(&self, layout_id: LayoutId) -> Result<()> {
        self.ensure_mounted()?;
        self.inputs.borrow_mut().layout = layout_id;
        tracing::info!(layout = %layout_id, "layout selected");
        self.trigger().await
    }

    /// Show a new ordered frame list. An empty list clears the data.
    pub async fn set_frames(&self, frames: Vec<FrameReference>) -> Result<()> {
        self.ensure_mounted()?;
        tracing::debug!(frames = frames.len(), "frame list received");
        self.inputs.borrow_mut().frames = Rc::from(frames);
        self.trigger().await
    }

    /// Re-run whatever failed last: setup after a setup failure, otherwise
    /// the full reconcile-and-assign sequence with the current inputs.
    pub async fn retry(&self) -> Result<()> {
        self.ensure_mounted()?;
        match self.state.get() {
            ViewerState::Uninitialized => Ok(()),
            ViewerState::SetupFailed => {
                let auth = self.auth.borrow().clone();
                match auth {
                    Some(auth) => self.bring_up(auth).await,
                    None => Ok(()),
                }
            }
            _ => self.trigger().await,
        }
    }

    async fn trigger(&self) -> Result<()> {
        if !self.initialized.get() {
            return Ok(());
        }
        let token = self.begin();
        self.run(token, Assign::All).await
    }

    /// Start a new epoch and supersede the running sequence.
    fn begin(&self) -> LiveToken {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        let token = LiveToken::new(epoch);
        let previous = self.live.replace(token.clone());
        previous.supersede();
        token
    }

    async fn run(&self, token: LiveToken, assign: Assign) -> Result<()> {
        let span = tracing::debug_span!("reconcile", epoch = token.epoch(), ?assign);
        self.reconcile(token, assign).instrument(span).await
    }

    async fn reconcile(&self, token: LiveToken, assign: Assign) -> Result<()> {
        let (layout_id, frames) = {
            let inputs = self.inputs.borrow();
            (inputs.layout, inputs.frames.clone())
        };
        let definition = layout(layout_id);
        let frame_count = frames.len();

        let mut engine = self.engine.lock().await;
        if !self.advance(&token, ViewerState::PanesReconciling)? {
            return Ok(());
        }
        let containers = self.containers.borrow().clone();
        self.containers_dirty.set(false);
        let report = engine
            .reconcile_panes(
                definition.panes,
                |pane| resolve_mode(pane, frame_count),
                |pane_id| containers.get(pane_id).cloned(),
                &token,
            )
            .await?;
        if report.aborted || !token.is_live() {
            tracing::debug!("superseded during pane reconciliation");
            return Ok(());
        }
        if !report.is_noop() {
            tracing::info!(
                layout = %layout_id,
                created = ?report.created,
                destroyed = ?report.destroyed,
                skipped = ?report.skipped,
                "panes reconciled"
            );
        }

        let bound = engine.bound_pane_ids();
        let bindings = self.tools.borrow_mut().attach(&bound, definition).clone();
        engine.apply_tools(&bindings);
        self.advance(&token, ViewerState::PanesReady)?;

        if frames.is_empty() || bound.is_empty() {
            self.advance(&token, ViewerState::Interactive)?;
            return Ok(());
        }
        self.advance(&token, ViewerState::DataAssigning)?;

        let mut volume_panes: Vec<(PaneId, Option<Orientation>)> = Vec::new();
        let mut stack_panes: Vec<PaneId> = Vec::new();
        let targets = engine
            .bindings()
            .filter(|(pane_id, _)| assign == Assign::All || report.created.contains(pane_id));
        for (pane_id, binding) in targets {
            if binding.mode == DisplayMode::Stack {
                stack_panes.push(pane_id);
            } else {
                volume_panes.push((pane_id, binding.orientation));
            }
        }
        for pane_id in stack_panes {
            engine.assign_stack(pane_id, &frames);
        }
        if volume_panes.is_empty() {
            self.advance(&token, ViewerState::Interactive)?;
            return Ok(());
        }

        // The load may take a while; let newer sequences reach the surface.
        drop(engine);
        let identity = VolumeIdentity::of(&frames);
        let loaded = self
            .cache
            .get_or_load(identity, || self.source.load(&frames))
            .await;
        if !token.is_live() {
            tracing::debug!(%identity, "superseded while loading; result discarded");
            return Ok(());
        }
        let handle = match loaded {
            Ok(handle) => handle,
            Err(source) => {
                self.advance(&token, ViewerState::LoadFailed)?;
                return Err(ViewerError::Load { identity, source });
            }
        };

        let mut engine = self.engine.lock().await;
        for (pane_id, orientation) in volume_panes {
            if !token.is_live() {
                return Ok(());
            }
            engine.assign_volume(pane_id, &handle, orientation).await;
        }
        self.advance(&token, ViewerState::Interactive)?;
        Ok(())
    }

    /// Move to `next` if `token` is still live. Returns false when superseded.
    fn advance(&self, token: &LiveToken, next: ViewerState) -> Result<bool> {
        if !token.is_live() || self.state.get() == ViewerState::Unmounted {
            return Ok(false);
        }
        self.transition(next)?;
        Ok(true)
    }

    fn transition(&self, next: ViewerState) -> Result<()> {
        let from = self.state.get();
        if !from.can_transition_to(next) {
            tracing::warn!(?from, to = ?next, "rejected viewer transition");
            return Err(ViewerError::InvalidTransition { from, to: next });
        }
        if from != next {
            tracing::debug!(?from, to = ?next, "viewer transition");
        }
        self.state.set(next);
        Ok(())
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.state.get() == ViewerState::Unmounted {
            return Err(ViewerError::Unmounted);
        }
        Ok(())
    }

    /// The host rendered a container for `pane_id`.
    pub fn mount_container(&self, pane_id: PaneId, region: ContainerRegion) {
        if self.state.get() == ViewerState::Unmounted {
            return;
        }
        self.resize
            .borrow_mut()
            .observe(pane_id, region.width, region.height);
        let element = region.element_id.clone();
        let previous = self.containers.borrow_mut().insert(pane_id, region);
        if previous.is_none_or(|previous| previous.element_id != element) {
            self.containers_dirty.set(true);
        }
    }

    /// The host removed the container for `pane_id`.
    pub fn unmount_container(&self, pane_id: PaneId) {
        self.resize.borrow_mut().unobserve(pane_id);
        if self.containers.borrow_mut().remove(pane_id).is_some() {
            self.containers_dirty.set(true);
        }
    }

    /// Handle for the host's geometry observer.
    pub fn resize_observer(&self) -> ResizeObserver {
        self.observer.clone()
    }

    /// Called once per display frame.
    ///
    /// Applies queued geometry events. A scheduled resize re-projects the
    /// surface, keeping cameras. Container changes, and pending panes whose
    /// container gained area, are then reconciled; while the viewer is
    /// interactive only the panes that pass creates receive data. Returns
    /// whether anything ran.
    pub async fn on_animation_frame(&self, now: Instant) -> Result<bool> {
        self.ensure_mounted()?;
        if !self.initialized.get() {
            return Ok(false);
        }
        let applied = self.resize.borrow_mut().drain();
        {
            let mut containers = self.containers.borrow_mut();
            for event in applied {
                if let Some(region) = containers.get_mut(event.pane_id) {
                    region.width = event.width;
                    region.height = event.height;
                }
            }
        }
        let pass = self.resize.borrow_mut().poll_frame(now);
        let dirty = self.containers_dirty.replace(false);

        let mut grown = false;
        if let Some(pass) = &pass {
            let mut engine = self.engine.lock().await;
            let refit = engine.reproject();
            tracing::debug!(visible = ?pass.visible, refit = ?refit, "surface re-projected");
            let containers = self.containers.borrow();
            grown = engine.pending_pane_ids().any(|pane_id| {
                containers
                    .get(pane_id)
                    .is_some_and(ContainerRegion::has_area)
            });
        }
        if !dirty && !grown {
            return Ok(pass.is_some());
        }
        let assign = if self.state.get() == ViewerState::Interactive {
            Assign::Created
        } else {
            Assign::All
        };
        let token = self.begin();
        self.run(token, assign).await?;
        Ok(true)
    }

    /// Put `tool` on the primary button. Returns false when unavailable.
    pub async fn activate_tool(&self, tool: Tool) -> Result<bool> {
        self.ensure_mounted()?;
        if !self.tools.borrow_mut().activate(tool) {
            return Ok(false);
        }
        let bindings = self.tools.borrow().bindings().clone();
        self.engine.lock().await.apply_tools(&bindings);
        tracing::debug!(%tool, "tool activated");
        Ok(true)
    }

    /// Tear everything down. Only the first call acts.
    pub async fn unmount(&self) -> Result<()> {
        if self.state.get() == ViewerState::Unmounted {
            return Ok(());
        }
        self.live.borrow().supersede();
        let mut engine = self.engine.lock().await;
        if self.state.get() == ViewerState::Unmounted {
            return Ok(());
        }
        self.tools.borrow_mut().detach_all();
        engine.destroy_surface();
        drop(engine);

        self.resize.borrow_mut().unobserve_all();
        self.containers.borrow_mut().clear();
        self.cache.clear();
        self.transition(ViewerState::Unmounted)?;
        tracing::info!("viewer unmounted");
        Ok(())
    }

    /// Container slots for the current layout.
    pub fn embed(&self) -> EmbedLayout {
        let definition = layout(self.inputs.borrow().layout);
        let cols = definition.grid.cols.max(1);
        let slots = definition
            .pane_ids()
            .enumerate()
            .map(|(index, pane_id)| {
                let index = index as u16;
                PaneSlot {
                    pane_id,
                    element_id: element_id(pane_id),
                    row: index / cols,
                    col: index % cols,
                }
            })
            .collect();
        EmbedLayout {
            layout_id: definition.layout_id,
            grid: definition.grid,
            slots,
        }
    }

    pub fn toolbar(&self) -> ToolbarState {
        let tools = self.tools.borrow();
        ToolbarState {
            layout_id: self.inputs.borrow().layout,
            tools: tools.available_tools(),
            active_tool: tools.active_tool(),
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state.get()
    }

    pub fn layout_id(&self) -> LayoutId {
        self.inputs.borrow().layout
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Snapshot of the live pane bindings.
    pub async fn panes(&self) -> Vec<(PaneId, PaneBinding)> {
        self.engine
            .lock()
            .await
            .bindings()
            .map(|(pane_id, binding)| (pane_id, binding.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessBackend, HeadlessLog, SurfaceOp};
    use crate::volume::Volume;
    use crate::volume_loader::VolumeLoaderError;
    use ndarray::Array3;
    use std::future::{Ready, ready};
    use std::sync::Arc;

    fn frames(count: usize) -> Vec<FrameReference> {
        (0..count)
            .map(|i| FrameReference::new(format!("dicomfile:/series/{i}.dcm")))
            .collect()
    }

    type ZeroSource = fn(Vec<FrameReference>) -> Ready<std::result::Result<Volume, VolumeLoaderError>>;

    fn zeros(frames: Vec<FrameReference>) -> Ready<std::result::Result<Volume, VolumeLoaderError>> {
        ready(Ok(Volume::new(
            Array3::zeros((frames.len(), 8, 8)),
            (1.0, 1.0, 1.0),
        )))
    }

    fn no_token() -> AuthTokenProvider {
        Arc::new(|| None)
    }

    fn controller(layout_id: LayoutId) -> (ViewerController<HeadlessBackend, ZeroSource>, HeadlessLog) {
        let backend = HeadlessBackend::new();
        let log = backend.log();
        let config = ViewerConfig {
            default_layout: layout_id,
            ..ViewerConfig::default()
        };
        let controller = ViewerController::new(backend, zeros as ZeroSource, &config);
        for pane_id in layout(layout_id).pane_ids() {
            controller.mount_container(pane_id, ContainerRegion::new(element_id(pane_id), 256, 256));
        }
        (controller, log)
    }

    #[test]
    fn transition_table() {
        use ViewerState::*;
        assert!(Uninitialized.can_transition_to(SurfaceReady));
        assert!(!Uninitialized.can_transition_to(PanesReconciling));
        assert!(PanesReady.can_transition_to(Interactive));
        assert!(DataAssigning.can_transition_to(LoadFailed));
        assert!(LoadFailed.can_transition_to(PanesReconciling));
        assert!(!Interactive.can_transition_to(DataAssigning));
        assert!(SetupFailed.can_transition_to(Unmounted));
        assert!(!Unmounted.can_transition_to(Unmounted));
        assert!(!Unmounted.can_transition_to(SurfaceReady));
    }

    #[tokio::test]
    async fn inputs_before_initialize_are_applied_on_setup() {
        let (controller, log) = controller(LayoutId::Single);
        controller.set_frames(frames(5)).await.unwrap();
        assert_eq!(controller.state(), ViewerState::Uninitialized);
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::Enable { .. })), 0);

        controller.initialize(no_token()).await.unwrap();
        assert_eq!(controller.state(), ViewerState::Interactive);
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::SetVolume { .. })), 1);
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (controller, log) = controller(LayoutId::Single);
        let (first, second) =
            futures::join!(controller.initialize(no_token()), controller.initialize(no_token()));
        first.unwrap();
        second.unwrap();
        controller.initialize(no_token()).await.unwrap();
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::Initialize)), 1);
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::CreateSurface)), 1);
    }

    #[tokio::test]
    async fn empty_frame_list_ends_interactive_without_data() {
        let (controller, log) = controller(LayoutId::Orthogonal);
        controller.initialize(no_token()).await.unwrap();
        assert_eq!(controller.state(), ViewerState::Interactive);
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::Enable { .. })), 3);
        assert_eq!(log.count(|op| matches!(op, SurfaceOp::SetStack { .. } | SurfaceOp::SetVolume { .. })), 0);
        assert_eq!(controller.cache_stats().misses, 0);
    }

    #[tokio::test]
    async fn stack_panes_receive_frames_with_auth() {
        let (controller, log) = controller(LayoutId::Stack);
        controller
            .initialize(Arc::new(|| Some("bearer".to_string())))
            .await
            .unwrap();
        controller.set_frames(frames(12)).await.unwrap();

        assert!(log.ops().contains(&SurfaceOp::SetStack {
            pane: "stack",
            frames: 12,
            authorized: true,
        }));
        assert_eq!(controller.cache_stats().misses, 0);
    }

    #[test]
    fn embed_places_slots_on_the_grid() {
        let (controller, _log) = controller(LayoutId::Mixed);
        let embed = controller.embed();
        assert_eq!(embed.grid, GridShape { rows: 2, cols: 2 });
        let placed: Vec<_> = embed
            .slots
            .iter()
            .map(|slot| (slot.element_id.as_str(), slot.row, slot.col))
            .collect();
        assert_eq!(
            placed,
            vec![
                ("viewport-axial", 0, 0),
                ("viewport-sagittal", 0, 1),
                ("viewport-coronal", 1, 0),
                ("viewport-volume-3d", 1, 1),
            ]
        );
    }

    #[tokio::test]
    async fn toolbar_tracks_cross_pane_availability() {
        let (controller, _log) = controller(LayoutId::Orthogonal);
        controller.mount_container("single", ContainerRegion::new(element_id("single"), 256, 256));
        controller.initialize(no_token()).await.unwrap();
        assert!(controller.toolbar().tools.contains(&Tool::Crosshairs));
        assert!(controller.activate_tool(Tool::Crosshairs).await.unwrap());

        controller.select_layout(LayoutId::Single).await.unwrap();
        let toolbar = controller.toolbar();
        assert_eq!(toolbar.layout_id, LayoutId::Single);
        assert!(!toolbar.tools.contains(&Tool::Crosshairs));
        assert_eq!(toolbar.active_tool, Tool::WindowLevel);
    }

    #[tokio::test]
    async fn calls_after_unmount_are_rejected() {
        let (controller, log) = controller(LayoutId::Single);
        controller.initialize(no_token()).await.unwrap();
        controller.unmount().await.unwrap();
        controller.unmount().await.unwrap();

        assert_eq!(log.count(|op| matches!(op, SurfaceOp::Destroy)), 1);
        assert!(matches!(
            controller.set_frames(frames(3)).await,
            Err(ViewerError::Unmounted)
        ));
        assert!(matches!(
            controller.initialize(no_token()).await,
            Err(ViewerError::Unmounted)
        ));
    }
}
