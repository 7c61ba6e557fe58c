//! Best-effort occlusion filtering from snapshot paint order.
//!
//! A node painted beneath an opaque element that covers its whole rect
//! cannot be clicked, so it is dropped from the interactive set. Only
//! fully-covering occluders count; partial overlays (sticky headers,
//! toasts) leave the node usable.

use pagelens_dom_fusion::{FusedGraph, NodeIdx, NodeKind};

/// Minimum covered fraction for a node to count as occluded.
const COVER_THRESHOLD: f64 = 0.95;

pub struct PaintOrderFilter {
    /// Visible, opaque, positively-painted candidates, by arena index.
    occluders: Vec<NodeIdx>,
}

impl PaintOrderFilter {
    pub fn new(graph: &FusedGraph) -> Self {
        let occluders = graph
            .preorder()
            .into_iter()
            .filter(|idx| {
                let node = graph.node(*idx);
                node.kind == NodeKind::Element
                    && node.is_visible
                    && node.absolute_bounds.map(|b| b.area() > 0.0).unwrap_or(false)
                    && node.layout.as_ref().and_then(|l| l.paint_order).is_some()
                    && is_opaque(graph, *idx)
            })
            .collect();
        Self { occluders }
    }

    pub fn occluded(&self, graph: &FusedGraph, idx: NodeIdx) -> bool {
        let node = graph.node(idx);
        let Some(bounds) = node.absolute_bounds else {
            return false;
        };
        let Some(order) = node.layout.as_ref().and_then(|l| l.paint_order) else {
            return false;
        };
        self.occluders.iter().any(|candidate| {
            if *candidate == idx || related(graph, idx, *candidate) {
                return false;
            }
            let other = graph.node(*candidate);
            let Some(other_bounds) = other.absolute_bounds else {
                return false;
            };
            let Some(other_order) = other.layout.as_ref().and_then(|l| l.paint_order) else {
                return false;
            };
            other_order > order && bounds.overlap_fraction(&other_bounds) >= COVER_THRESHOLD
        })
    }
}

/// Opaque enough to block clicks: full opacity and a background that is
/// not explicitly transparent is assumed for elements the renderer painted.
fn is_opaque(graph: &FusedGraph, idx: NodeIdx) -> bool {
    let node = graph.node(idx);
    node.layout
        .as_ref()
        .and_then(|l| l.style("opacity"))
        .and_then(|o| o.parse::<f64>().ok())
        .map(|o| o >= 1.0)
        .unwrap_or(true)
        && node
            .layout
            .as_ref()
            .and_then(|l| l.style("pointer-events"))
            != Some("none")
}

/// Ancestor/descendant pairs never occlude each other.
fn related(graph: &FusedGraph, a: NodeIdx, b: NodeIdx) -> bool {
    is_ancestor(graph, a, b) || is_ancestor(graph, b, a)
}

fn is_ancestor(graph: &FusedGraph, ancestor: NodeIdx, mut node: NodeIdx) -> bool {
    while let Some(parent) = graph.node(node).parent {
        if parent == ancestor {
            return true;
        }
        node = parent;
    }
    false
}
