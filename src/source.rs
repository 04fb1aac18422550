//! Where volumes come from.
//!
//! A [`VolumeSource`] turns an ordered frame list into a [`Volume`]. The
//! controller only calls it on a cache miss, and never twice for the same
//! identity while a load is in flight.

use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::enums::SortBy;
use crate::frame::FrameReference;
use crate::volume::Volume;
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

pub trait VolumeSource {
    /// Start loading the volume for `frames`.
    ///
    /// The returned future must not borrow from `self`; it may outlive the
    /// request that started it when that request is superseded.
    fn load(&self, frames: &[FrameReference]) -> LocalBoxFuture<'static, Result<Volume, VolumeLoaderError>>;
}

impl<F, Fut> VolumeSource for F
where
    F: Fn(Vec<FrameReference>) -> Fut,
    Fut: Future<Output = Result<Volume, VolumeLoaderError>> + 'static,
{
    fn load(&self, frames: &[FrameReference]) -> LocalBoxFuture<'static, Result<Volume, VolumeLoaderError>> {
        self(frames.to_vec()).boxed_local()
    }
}

/// Reads local DICOM files on the blocking pool.
///
/// Accepts `dicomfile:`, `file://` and bare path references. Remote schemes
/// are rejected before any file is touched.
#[derive(Clone, Copy, Debug, Default)]
pub struct DicomFileSource {
    sort_by: SortBy,
}

impl DicomFileSource {
    pub fn new(sort_by: SortBy) -> Self {
        Self { sort_by }
    }

    pub fn sort_by(&self) -> SortBy {
        self.sort_by
    }
}

impl VolumeSource for DicomFileSource {
    fn load(&self, frames: &[FrameReference]) -> LocalBoxFuture<'static, Result<Volume, VolumeLoaderError>> {
        let frames = frames.to_vec();
        let sort_by = self.sort_by;
        async move {
            // Fail fast on remote references without occupying a blocking thread.
            VolumeLoader::resolve_paths(&frames)?;
            let count = frames.len();
            let volume = tokio::task::spawn_blocking(move || VolumeLoader::load_from_frames(&frames, sort_by))
                .await
                .map_err(|err| {
                    if err.is_cancelled() {
                        VolumeLoaderError::Cancelled
                    } else {
                        VolumeLoaderError::Source(err.to_string())
                    }
                })??;
            tracing::debug!(frames = count, dim = ?volume.dim(), "volume decoded");
            Ok(volume)
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[tokio::test]
    async fn closures_are_sources() {
        let source = |frames: Vec<FrameReference>| async move {
            Ok(Volume::new(Array3::zeros((frames.len(), 2, 2)), (1.0, 1.0, 1.0)))
        };
        let frames = vec![FrameReference::new("a"), FrameReference::new("b")];
        let volume = source.load(&frames).await.unwrap();
        assert_eq!(volume.dim(), (2, 2, 2));
    }

    #[tokio::test]
    async fn remote_references_are_unsupported() {
        let source = DicomFileSource::new(SortBy::None);
        let frames = vec![FrameReference::new("wadouri:https://pacs.example/wado?objectUID=1")];
        let result = source.load(&frames).await;
        assert!(matches!(result, Err(VolumeLoaderError::UnsupportedReference(_))));
    }

    #[tokio::test]
    async fn missing_files_surface_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.dcm");
        let frames = vec![FrameReference::new(format!("dicomfile:{}", missing.display()))];
        let result = DicomFileSource::new(SortBy::None).load(&frames).await;
        assert!(result.is_err());
    }
}
