use std::sync::Arc;

use thiserror::Error;

use crate::controller::ViewerState;
use crate::identity::VolumeIdentity;
use crate::surface::SurfaceError;
use crate::volume_loader::VolumeLoaderError;

#[derive(Debug, Error)]
pub enum ViewerError {
    /// The rendering capability could not be brought up. Fatal to the session.
    #[error("Viewer setup failed: {0}")]
    Setup(#[source] SurfaceError),

    /// Loading the volume failed. Retryable; the cache is left untouched.
    #[error("Failed to load volume {identity}: {source}")]
    Load {
        identity: VolumeIdentity,
        #[source]
        source: Arc<VolumeLoaderError>,
    },

    #[error("Rendering surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Unknown layout: {0}")]
    UnknownLayout(String),

    #[error("Invalid viewer transition {from:?} -> {to:?}")]
    InvalidTransition { from: ViewerState, to: ViewerState },

    #[error("Viewer has been unmounted")]
    Unmounted,

    #[error("Failed to serialize configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ViewerError {
    /// Whether retrying the same inputs can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ViewerError::Load { .. })
    }
}

pub type Result<T, E = ViewerError> = std::result::Result<T, E>;
