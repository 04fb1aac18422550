//! Interaction tools and cross-pane synchronization.
//!
//! Two shared tool groups exist for the whole session: one for 2D panes
//! (stacks and reformatted slices) and one for 3D renderings. After every
//! pane reconciliation both groups are emptied and refilled with exactly the
//! panes that are enabled, and the window-level synchronizer is rebuilt over
//! the same set.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::layout::{LayoutDefinition, PaneId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    WindowLevel,
    Pan,
    Zoom,
    StackScroll,
    Length,
    Probe,
    RectangleRoi,
    EllipticalRoi,
    Angle,
    TrackballRotate,
    Crosshairs,
    ReferenceLines,
}

impl Tool {
    pub const ALL: [Tool; 12] = [
        Tool::WindowLevel,
        Tool::Pan,
        Tool::Zoom,
        Tool::StackScroll,
        Tool::Length,
        Tool::Probe,
        Tool::RectangleRoi,
        Tool::EllipticalRoi,
        Tool::Angle,
        Tool::TrackballRotate,
        Tool::Crosshairs,
        Tool::ReferenceLines,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tool::WindowLevel => "window-level",
            Tool::Pan => "pan",
            Tool::Zoom => "zoom",
            Tool::StackScroll => "stack-scroll",
            Tool::Length => "length",
            Tool::Probe => "probe",
            Tool::RectangleRoi => "rectangle-roi",
            Tool::EllipticalRoi => "elliptical-roi",
            Tool::Angle => "angle",
            Tool::TrackballRotate => "trackball-rotate",
            Tool::Crosshairs => "crosshairs",
            Tool::ReferenceLines => "reference-lines",
        }
    }

    /// Only meaningful on 3D renderings.
    pub fn is_3d_only(self) -> bool {
        matches!(self, Tool::TrackballRotate)
    }

    /// Needs at least two 2D panes to mean anything.
    pub fn is_cross_pane(self) -> bool {
        matches!(self, Tool::Crosshairs | Tool::ReferenceLines)
    }

    /// Can be put on the primary button from the toolbar.
    pub fn is_selectable(self) -> bool {
        !self.is_3d_only() && self != Tool::ReferenceLines
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseBinding {
    Primary,
    Secondary,
    Auxiliary,
    Wheel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolMode {
    Active(MouseBinding),
    /// Existing annotations stay interactive.
    Passive,
    /// Drawn but not interactive.
    Enabled,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolGroupKind {
    TwoD,
    ThreeD,
}

impl ToolGroupKind {
    pub fn group_id(self) -> &'static str {
        match self {
            ToolGroupKind::TwoD => "tool-group-2d",
            ToolGroupKind::ThreeD => "tool-group-3d",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolGroup {
    pub kind: ToolGroupKind,
    pub panes: BTreeSet<PaneId>,
    pub modes: BTreeMap<Tool, ToolMode>,
}

impl ToolGroup {
    fn new(kind: ToolGroupKind) -> Self {
        Self {
            kind,
            panes: BTreeSet::new(),
            modes: BTreeMap::new(),
        }
    }

    pub fn mode(&self, tool: Tool) -> ToolMode {
        self.modes.get(&tool).copied().unwrap_or(ToolMode::Disabled)
    }
}

/// Snapshot of every binding, handed to the rendering surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolBindings {
    pub two_d: ToolGroup,
    pub three_d: ToolGroup,
    /// Window-level changes on any of these panes are mirrored to all others.
    pub window_level_sync: BTreeSet<PaneId>,
}

impl ToolBindings {
    fn empty() -> Self {
        Self {
            two_d: ToolGroup::new(ToolGroupKind::TwoD),
            three_d: ToolGroup::new(ToolGroupKind::ThreeD),
            window_level_sync: BTreeSet::new(),
        }
    }

    pub fn group_of(&self, pane_id: &str) -> Option<ToolGroupKind> {
        if self.two_d.panes.contains(pane_id) {
            Some(ToolGroupKind::TwoD)
        } else if self.three_d.panes.contains(pane_id) {
            Some(ToolGroupKind::ThreeD)
        } else {
            None
        }
    }

    pub fn cross_pane_enabled(&self) -> bool {
        self.two_d.mode(Tool::ReferenceLines) != ToolMode::Disabled
    }

    pub fn is_empty(&self) -> bool {
        self.two_d.panes.is_empty() && self.three_d.panes.is_empty()
    }

    /// Drop `pane_id` from both groups and the synchronizer. Returns whether
    /// it was bound anywhere.
    pub fn remove_pane(&mut self, pane_id: &str) -> bool {
        let two_d = self.two_d.panes.remove(pane_id);
        let three_d = self.three_d.panes.remove(pane_id);
        let synced = self.window_level_sync.remove(pane_id);
        two_d || three_d || synced
    }

    /// Drop every pane, keeping the tool modes. Returns whether any was bound.
    pub fn clear_panes(&mut self) -> bool {
        let had_panes = !self.is_empty() || !self.window_level_sync.is_empty();
        self.two_d.panes.clear();
        self.three_d.panes.clear();
        self.window_level_sync.clear();
        had_panes
    }
}

pub struct ToolCoordinator {
    bindings: ToolBindings,
    default_tool: Tool,
    active_tool: Tool,
}

impl ToolCoordinator {
    pub fn new(default_tool: Tool) -> Self {
        let default_tool = if default_tool.is_selectable() && !default_tool.is_cross_pane() {
            default_tool
        } else {
            Tool::WindowLevel
        };
        let mut coordinator = Self {
            bindings: ToolBindings::empty(),
            default_tool,
            active_tool: default_tool,
        };
        coordinator.refresh_modes(false);
        coordinator
    }

    /// Rebind both groups and the synchronizer to exactly `active_panes`.
    ///
    /// 3D-flagged panes go to the 3D group, everything else to the 2D group.
    /// Crosshairs and reference lines are available only while two or more
    /// 2D panes are active.
    pub fn attach(&mut self, active_panes: &[PaneId], layout: &LayoutDefinition) -> &ToolBindings {
        self.bindings.two_d.panes.clear();
        self.bindings.three_d.panes.clear();
        self.bindings.window_level_sync.clear();

        for &pane_id in active_panes {
            let is_3d = match layout.pane(pane_id) {
                Some(def) => def.is_3d,
                None => {
                    tracing::warn!(pane = pane_id, layout = %layout.layout_id, "pane not in layout; binding as 2D");
                    false
                }
            };
            if is_3d {
                self.bindings.three_d.panes.insert(pane_id);
            } else {
                self.bindings.two_d.panes.insert(pane_id);
            }
            self.bindings.window_level_sync.insert(pane_id);
        }

        let cross_pane = self.bindings.two_d.panes.len() >= 2;
        if !cross_pane && self.active_tool.is_cross_pane() {
            tracing::debug!(tool = %self.active_tool, fallback = %self.default_tool, "active tool no longer available");
            self.active_tool = self.default_tool;
        }
        self.refresh_modes(cross_pane);
        tracing::debug!(
            two_d = self.bindings.two_d.panes.len(),
            three_d = self.bindings.three_d.panes.len(),
            cross_pane,
            "tools attached"
        );
        &self.bindings
    }

    /// Release both groups and the synchronizer.
    pub fn detach_all(&mut self) {
        self.bindings = ToolBindings::empty();
        self.active_tool = self.default_tool;
        tracing::debug!("tools detached");
    }

    /// Put `tool` on the primary button of the 2D group.
    ///
    /// Returns false when the tool cannot be activated right now.
    pub fn activate(&mut self, tool: Tool) -> bool {
        if !self.available_tools().contains(&tool) {
            tracing::warn!(%tool, "tool is not available");
            return false;
        }
        self.active_tool = tool;
        let cross_pane = self.bindings.cross_pane_enabled();
        self.refresh_modes(cross_pane);
        true
    }

    /// Tools the toolbar may offer in the current pane configuration.
    pub fn available_tools(&self) -> Vec<Tool> {
        let cross_pane = self.bindings.cross_pane_enabled();
        Tool::ALL
            .into_iter()
            .filter(|tool| tool.is_selectable())
            .filter(|tool| cross_pane || !tool.is_cross_pane())
            .collect()
    }

    pub fn active_tool(&self) -> Tool {
        self.active_tool
    }

    pub fn bindings(&self) -> &ToolBindings {
        &self.bindings
    }

    fn refresh_modes(&mut self, cross_pane: bool) {
        let active = self.active_tool;
        let two_d = &mut self.bindings.two_d.modes;
        two_d.clear();
        for tool in Tool::ALL.into_iter().filter(|tool| !tool.is_3d_only()) {
            let mode = match tool {
                _ if tool == active => ToolMode::Active(MouseBinding::Primary),
                Tool::Pan => ToolMode::Active(MouseBinding::Auxiliary),
                Tool::Zoom => ToolMode::Active(MouseBinding::Secondary),
                Tool::StackScroll => ToolMode::Active(MouseBinding::Wheel),
                Tool::ReferenceLines if cross_pane => ToolMode::Enabled,
                Tool::Crosshairs if cross_pane => ToolMode::Passive,
                Tool::ReferenceLines | Tool::Crosshairs => ToolMode::Disabled,
                _ => ToolMode::Passive,
            };
            two_d.insert(tool, mode);
        }

        let three_d = &mut self.bindings.three_d.modes;
        three_d.clear();
        three_d.insert(Tool::TrackballRotate, ToolMode::Active(MouseBinding::Primary));
        three_d.insert(Tool::Zoom, ToolMode::Active(MouseBinding::Secondary));
        three_d.insert(Tool::Pan, ToolMode::Active(MouseBinding::Auxiliary));
    }
}
