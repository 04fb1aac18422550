//! # DICOM viewport library
//!
//! This crate orchestrates a multi-pane DICOM viewer: it decides which panes
//! exist for a layout, whether each pane shows a scrollable stack of frames
//! or a reconstructed volume, loads that volume at most once per series, and
//! keeps interaction tools and resize handling attached to the right panes.
//!
//! Rasterization, frame decoding and camera math are not part of this crate.
//! They live behind the [`RenderingBackend`] and [`RenderingSurface`] traits,
//! which a host implements for its rendering engine. A [`HeadlessBackend`]
//! is included for tests and tooling.
//!
//! Volumes are built from local DICOM files with the dicom-rs ecosystem and
//! can be sliced in the three medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! DICOM files are assumed to have the following attributes:
//!   - Axial data set (only Coronal and Sagittal axes are interpolated)
//!   - No multiframe (always the first frame is used)
//!   - Images from the same series and acquisition
//!
//! # Panes and modes
//!
//! A pane with a single frame is always a stack. With more frames, a 3D pane
//! renders the volume, an oriented pane shows a reformatted slice, and a
//! plain pane stays a stack. Changing the mode of a pane recreates it.
//!
//! # Examples
//!
//! ## Driving a viewer
//!
//! Show a directory of DICOM files in the three orthogonal planes, then
//! switch to a single pane. The volume is loaded once.
//!
//! ```no_run
//! # use dicom_viewport::{
//! #     config::ViewerConfig, headless::HeadlessBackend, layout::LayoutId,
//! #     source::DicomFileSource, surface::ContainerRegion, volume_loader::VolumeLoader,
//! #     ViewerController,
//! # };
//! # use std::sync::Arc;
//! # async fn run() -> dicom_viewport::error::Result<()> {
//! let config = ViewerConfig::default();
//! let viewer = ViewerController::new(
//!     HeadlessBackend::new(),
//!     DicomFileSource::new(config.sort_by),
//!     &config,
//! );
//! for slot in viewer.embed().slots {
//!     viewer.mount_container(slot.pane_id, ContainerRegion::new(slot.element_id, 512, 512));
//! }
//! viewer.initialize(Arc::new(|| None)).await?;
//!
//! let frames = VolumeLoader::frame_references_in("dicom").expect("should have found DICOM files");
//! viewer.set_frames(frames).await?;
//! viewer.select_layout(LayoutId::Single).await?;
//! viewer.unmount().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading one slice
//!
//! ```no_run
//! # use dicom_viewport::{VolumeLoader, Orientation, Interpolation, Processor, SortBy};
//! let frames = VolumeLoader::frame_references_in("dicom")
//!     .expect("should have found DICOM files");
//! let volume = VolumeLoader::load_from_frames(&frames, SortBy::InstanceNumber)
//!     .expect("should have loaded files from directory");
//! let image = volume
//!     .get_image_from_axis(
//!         volume.dim().2 / 2,
//!         Orientation::Sagittal,
//!         Interpolation::Bilinear(Processor::CPU),
//!     )
//!     .expect("should have returned image at center of volume");
//! image.save("result.png");
//! ```

pub mod cache;
pub mod config;
pub mod controller;
pub mod enums;
pub mod error;
pub mod frame;
pub mod headless;
pub mod identity;
mod interpolator;
pub mod layout;
pub mod lifecycle;
pub mod liveness;
pub mod pane_mode;
pub mod resize;
pub mod source;
pub mod surface;
pub mod tools;
pub mod volume;
pub mod volume_loader;

pub use controller::{ViewerController, ViewerState};
pub use enums::{DisplayMode, Interpolation, Orientation, Processor, SortBy};
pub use error::ViewerError;
pub use headless::HeadlessBackend;
pub use surface::{RenderingBackend, RenderingSurface};
pub use volume::{Volume, VolumeHandle};
pub use volume_loader::VolumeLoader;
