//! Default values for every configuration field.

use crate::enums::SortBy;
use crate::layout::LayoutId;
use crate::tools::Tool;

// ==========================================================================
// Layout & Tools
// ==========================================================================

/// Layout shown before the host selects one.
pub const DEFAULT_LAYOUT: LayoutId = LayoutId::Orthogonal;

/// Tool bound to the primary button of the 2D group.
pub const DEFAULT_TOOL: Tool = Tool::WindowLevel;

// ==========================================================================
// Resize Coalescing
// ==========================================================================

/// Minimum time between two re-projection passes (one display frame at 60 Hz).
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

pub const MIN_FRAME_INTERVAL_MS: u64 = 1;

pub const MAX_FRAME_INTERVAL_MS: u64 = 1000;

// ==========================================================================
// Volume Data
// ==========================================================================

/// Frame references arrive in acquisition order; keep it.
pub const DEFAULT_SORT_BY: SortBy = SortBy::None;

/// Transfer-function preset handed to the surface for 3D panes.
pub const DEFAULT_VOLUME_PRESET: &str = "CT-Bone";
