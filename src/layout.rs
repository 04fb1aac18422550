//! Static catalog of pane layouts.
//!
//! Layouts are defined once and never mutated. Pane ids are shared between
//! layouts whenever the pane means the same thing (the three orthogonal
//! planes), so switching between those layouts keeps the common panes alive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::enums::Orientation;
use crate::error::ViewerError;

pub type PaneId = &'static str;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutId {
    /// One axial pane.
    Single,
    /// One plain pane that always scrolls frames as a stack.
    Stack,
    /// Axial, sagittal and coronal side by side.
    Orthogonal,
    /// The three orthogonal planes plus a 3D rendering.
    Mixed,
}

impl LayoutId {
    pub const ALL: [LayoutId; 4] = [
        LayoutId::Single,
        LayoutId::Stack,
        LayoutId::Orthogonal,
        LayoutId::Mixed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayoutId::Single => "single",
            LayoutId::Stack => "stack",
            LayoutId::Orthogonal => "orthogonal",
            LayoutId::Mixed => "mixed",
        }
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutId {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayoutId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ViewerError::UnknownLayout(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridShape {
    pub rows: u16,
    pub cols: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaneDefinition {
    pub pane_id: PaneId,
    pub orientation: Option<Orientation>,
    pub is_3d: bool,
}

impl PaneDefinition {
    const fn plane(pane_id: PaneId, orientation: Orientation) -> Self {
        Self {
            pane_id,
            orientation: Some(orientation),
            is_3d: false,
        }
    }

    /// A pane with no axis and no 3D flag.
    pub fn is_plain(&self) -> bool {
        self.orientation.is_none() && !self.is_3d
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct LayoutDefinition {
    pub layout_id: LayoutId,
    pub grid: GridShape,
    pub panes: &'static [PaneDefinition],
}

impl LayoutDefinition {
    pub fn pane(&self, pane_id: &str) -> Option<&'static PaneDefinition> {
        self.panes.iter().find(|pane| pane.pane_id == pane_id)
    }

    pub fn pane_ids(&self) -> impl Iterator<Item = PaneId> + '_ {
        self.panes.iter().map(|pane| pane.pane_id)
    }
}

const AXIAL: PaneDefinition = PaneDefinition::plane("axial", Orientation::Axial);
const SAGITTAL: PaneDefinition = PaneDefinition::plane("sagittal", Orientation::Sagittal);
const CORONAL: PaneDefinition = PaneDefinition::plane("coronal", Orientation::Coronal);
const VOLUME_3D: PaneDefinition = PaneDefinition {
    pane_id: "volume-3d",
    orientation: None,
    is_3d: true,
};

static SINGLE: LayoutDefinition = LayoutDefinition {
    layout_id: LayoutId::Single,
    grid: GridShape { rows: 1, cols: 1 },
    panes: &[PaneDefinition::plane("single", Orientation::Axial)],
};

static STACK: LayoutDefinition = LayoutDefinition {
    layout_id: LayoutId::Stack,
    grid: GridShape { rows: 1, cols: 1 },
    panes: &[PaneDefinition {
        pane_id: "stack",
        orientation: None,
        is_3d: false,
    }],
};

static ORTHOGONAL: LayoutDefinition = LayoutDefinition {
    layout_id: LayoutId::Orthogonal,
    grid: GridShape { rows: 1, cols: 3 },
    panes: &[AXIAL, SAGITTAL, CORONAL],
};

static MIXED: LayoutDefinition = LayoutDefinition {
    layout_id: LayoutId::Mixed,
    grid: GridShape { rows: 2, cols: 2 },
    panes: &[AXIAL, SAGITTAL, CORONAL, VOLUME_3D],
};

/// Look up a layout. Total over [`LayoutId`].
pub fn layout(layout_id: LayoutId) -> &'static LayoutDefinition {
    match layout_id {
        LayoutId::Single => &SINGLE,
        LayoutId::Stack => &STACK,
        LayoutId::Orthogonal => &ORTHOGONAL,
        LayoutId::Mixed => &MIXED,
    }
}
