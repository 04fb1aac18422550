use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use dicom_viewport::{
    ViewerController,
    config,
    headless::{HeadlessBackend, SurfaceOp},
    layout::LayoutId,
    source::DicomFileSource,
    surface::ContainerRegion,
    volume_loader::VolumeLoader,
};
use tracing_subscriber::EnvFilter;
use web_time::Instant;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = env::args().skip(1);
    let dir = PathBuf::from(args.next().unwrap_or_else(|| "dicom".to_string()));
    let config = config::load().unwrap_or_default();
    let first_layout = args
        .next()
        .map(|name| name.parse::<LayoutId>().expect("should have been a known layout"))
        .unwrap_or(config.default_layout);

    let frames = VolumeLoader::frame_references_in(&dir).expect("should have found DICOM files");
    let backend = HeadlessBackend::new();
    let log = backend.log();
    let viewer = ViewerController::new(backend, DicomFileSource::new(config.sort_by), &config);

    viewer
        .select_layout(first_layout)
        .await
        .expect("should have selected layout");
    mount(&viewer);
    viewer
        .initialize(Arc::new(|| env::var("DICOM_VIEWPORT_TOKEN").ok()))
        .await
        .expect("should have initialized the viewer");
    viewer.set_frames(frames).await.expect("should have loaded the series");

    for layout_id in LayoutId::ALL {
        viewer
            .select_layout(layout_id)
            .await
            .expect("should have switched layout");
        mount(&viewer);
        viewer
            .on_animation_frame(Instant::now())
            .await
            .expect("should have handled the frame");
        for (pane_id, binding) in viewer.panes().await {
            tracing::info!(layout = %layout_id, pane = pane_id, mode = %binding.mode, "pane");
        }
    }

    for op in log.ops() {
        if let SurfaceOp::Slice { pane, width, height } = op {
            tracing::info!(pane, width, height, "slice rendered");
        }
    }
    tracing::info!(stats = ?viewer.cache_stats(), state = ?viewer.state(), "done");
    viewer.unmount().await.expect("should have unmounted");
}

fn mount<B, S>(viewer: &ViewerController<B, S>)
where
    B: dicom_viewport::RenderingBackend,
    S: dicom_viewport::source::VolumeSource,
{
    for slot in viewer.embed().slots {
        viewer.mount_container(slot.pane_id, ContainerRegion::new(slot.element_id, 512, 512));
    }
}
