//! Display mode selection for a pane.

use crate::enums::DisplayMode;
use crate::layout::PaneDefinition;

/// Decide how a pane presents `frame_count` frames.
///
/// A single frame cannot be reconstructed, so everything falls back to a
/// stack. Plain panes stay stacks even with many frames.
pub fn resolve_mode(pane: &PaneDefinition, frame_count: usize) -> DisplayMode {
    if frame_count <= 1 {
        return DisplayMode::Stack;
    }
    if pane.is_3d {
        DisplayMode::Volume3d
    } else if pane.orientation.is_some() {
        DisplayMode::Volume
    } else {
        DisplayMode::Stack
    }
}
