use std::fmt;

use serde::{Deserialize, Serialize};

/// Anatomical axis a volume pane is reformatted along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Axial => "axial",
            Orientation::Coronal => "coronal",
            Orientation::Sagittal => "sagittal",
        };
        f.write_str(name)
    }
}

/// How a pane presents its frames. Fixed for the lifetime of a pane instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayMode {
    /// Ordered 2D frames, one visible at a time.
    Stack,
    /// Reconstructed volume shown as a reformatted slice.
    Volume,
    /// Reconstructed volume shown as a rendered solid.
    Volume3d,
}

impl DisplayMode {
    pub fn is_volumetric(self) -> bool {
        !matches!(self, DisplayMode::Stack)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisplayMode::Stack => "stack",
            DisplayMode::Volume => "volume",
            DisplayMode::Volume3d => "volume-3d",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    Bilinear(Processor),
    // TODO:
    // Trilinear(Processor),
    // Cubic(Processor),
    #[default]
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Processor {
    CPU,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
