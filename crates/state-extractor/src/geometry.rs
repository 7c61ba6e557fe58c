//! Viewport and off-canvas filtering.

use pagelens_dom_fusion::{EnhancedNode, Viewport};

use crate::policy::ExtractorPolicy;

/// Whether `node` is actionable where it sits on screen.
///
/// `embedded` marks nodes inside an iframe or shadow root; their
/// coordinates are only approximate after frame-offset correction, so they
/// are exempt from the viewport test (off-canvas parking still applies).
pub fn passes_geometry(
    node: &EnhancedNode,
    viewport: &Viewport,
    policy: &ExtractorPolicy,
    embedded: bool,
) -> bool {
    if !node.is_visible {
        return false;
    }
    if node
        .layout
        .as_ref()
        .and_then(|l| l.style("pointer-events"))
        == Some("none")
    {
        return false;
    }
    let Some(bounds) = node.absolute_bounds else {
        return false;
    };
    if bounds.width <= 0.0 || bounds.height <= 0.0 {
        return false;
    }
    // Menus parked far off-canvas are a common hide technique.
    if bounds.x.abs() > policy.off_canvas_threshold_px
        || bounds.y.abs() > policy.off_canvas_threshold_px
    {
        return false;
    }
    if embedded {
        return true;
    }
    bounds.intersects(&viewport.buffered_rect(policy.viewport_buffer_px))
}
