//! Fused node graph model.
//!
//! Nodes live in a flat arena (`FusedGraph::nodes`) and refer to each other
//! by index, so parent links never form reference cycles and the whole
//! graph is freed in one drop.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use pagelens_core_types::{BackendNodeId, FrameId, TargetId};

pub type NodeIdx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Share of `self`'s area covered by the overlap with `other`.
    pub fn overlap_fraction(&self, other: &Rect) -> f64 {
        if self.area() <= 0.0 {
            return 0.0;
        }
        let w = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let h = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        (w * h) / self.area()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Document,
    Doctype,
    Other(i64),
}

impl NodeKind {
    pub fn from_node_type(node_type: i64) -> Self {
        match node_type {
            1 => NodeKind::Element,
            3 => NodeKind::Text,
            9 => NodeKind::Document,
            10 => NodeKind::Doctype,
            other => NodeKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxProperty {
    pub name: String,
    pub value: Value,
}

/// Accessibility record joined onto a DOM node by backend node id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxRecord {
    pub role: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub ignored: bool,
    pub properties: Vec<AxProperty>,
}

impl AxRecord {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn bool_property(&self, name: &str) -> Option<bool> {
        self.property(name).and_then(Value::as_bool)
    }
}

/// Scroll geometry of a scrolling container, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollInfo {
    pub scroll_top: f64,
    pub scroll_left: f64,
    pub scroll_height: f64,
    pub scroll_width: f64,
    pub client_height: f64,
    pub client_width: f64,
}

impl ScrollInfo {
    /// Whole viewports of content below the current scroll position.
    pub fn pages_below(&self) -> f64 {
        if self.client_height <= 0.0 {
            return 0.0;
        }
        ((self.scroll_height - self.client_height - self.scroll_top) / self.client_height)
            .max(0.0)
    }

    pub fn can_scroll_vertically(&self) -> bool {
        self.scroll_height > self.client_height + 1.0
    }

    pub fn can_scroll_horizontally(&self) -> bool {
        self.scroll_width > self.client_width + 1.0
    }
}

/// Layout-snapshot record for one node, normalized by device pixel ratio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutRecord {
    pub bounds: Option<Rect>,
    pub paint_order: Option<u32>,
    pub scroll: Option<ScrollInfo>,
    pub styles: HashMap<String, String>,
}

impl LayoutRecord {
    pub fn style(&self, name: &str) -> Option<&str> {
        self.styles.get(name).map(String::as_str)
    }

    /// Style-based visibility only; geometry and ancestors are checked by
    /// the builder.
    pub fn visible_by_style(&self) -> bool {
        if self.style("display") == Some("none") {
            return false;
        }
        if matches!(self.style("visibility"), Some("hidden") | Some("collapse")) {
            return false;
        }
        if let Some(opacity) = self.style("opacity").and_then(|v| v.parse::<f64>().ok()) {
            if opacity == 0.0 {
                return false;
            }
        }
        true
    }
}

/// One node of the fused graph: DOM structure plus the accessibility and
/// layout records that share its backend node id.
#[derive(Debug, Clone)]
pub struct EnhancedNode {
    pub node_id: i64,
    pub backend_node_id: BackendNodeId,
    pub kind: NodeKind,
    /// Lowercased element name; empty for non-elements.
    pub tag: String,
    /// Node value for text nodes.
    pub text: Option<String>,
    pub attributes: HashMap<String, String>,
    pub frame_id: Option<FrameId>,
    pub target_id: TargetId,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    pub content_document: Option<NodeIdx>,
    pub shadow_roots: Vec<NodeIdx>,
    pub ax: Option<AxRecord>,
    pub layout: Option<LayoutRecord>,
    /// Bounds in top-document coordinates after frame-offset correction.
    pub absolute_bounds: Option<Rect>,
    /// Style and geometry visibility, anded through all ancestor frames.
    pub is_visible: bool,
    pub is_scrollable: bool,
    /// Set on iframe elements whose content document crossed a process
    /// boundary.
    pub is_cross_origin_frame: bool,
    /// Renderer-reported click target flag from the layout snapshot.
    pub snapshot_clickable: bool,
}

impl EnhancedNode {
    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn ax_role(&self) -> Option<&str> {
        self.ax.as_ref().and_then(|ax| ax.role.as_deref())
    }

    pub fn ax_name(&self) -> Option<&str> {
        self.ax.as_ref().and_then(|ax| ax.name.as_deref())
    }

    /// Trimmed text content for text nodes.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub device_pixel_ratio: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            device_pixel_ratio: 1.0,
        }
    }
}

impl Viewport {
    /// Viewport rectangle expanded by `buffer` pixels on every side.
    pub fn buffered_rect(&self, buffer: f64) -> Rect {
        Rect::new(
            -buffer,
            -buffer,
            self.width + 2.0 * buffer,
            self.height + 2.0 * buffer,
        )
    }
}

/// Arena-backed fused graph for one extraction cycle.
#[derive(Debug)]
pub struct FusedGraph {
    pub nodes: Vec<EnhancedNode>,
    pub root: NodeIdx,
    pub viewport: Viewport,
    pub by_backend_id: HashMap<BackendNodeId, NodeIdx>,
}

impl FusedGraph {
    pub fn node(&self, idx: NodeIdx) -> &EnhancedNode {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut EnhancedNode {
        &mut self.nodes[idx]
    }

    pub fn by_backend_id(&self, id: BackendNodeId) -> Option<&EnhancedNode> {
        self.by_backend_id.get(&id).map(|idx| &self.nodes[*idx])
    }

    /// Structural children in document order: shadow roots, then regular
    /// children, then the content document of an iframe.
    pub fn structural_children(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let node = &self.nodes[idx];
        let mut out = Vec::with_capacity(
            node.shadow_roots.len() + node.children.len() + usize::from(node.content_document.is_some()),
        );
        out.extend(node.shadow_roots.iter().copied());
        out.extend(node.children.iter().copied());
        if let Some(doc) = node.content_document {
            out.push(doc);
        }
        out
    }

    /// Pre-order walk over the whole graph, frames included.
    pub fn preorder(&self) -> Vec<NodeIdx> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            let children = self.structural_children(idx);
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_overlap_fraction() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 0.0, 10.0, 10.0);
        assert!((a.overlap_fraction(&b) - 0.5).abs() < 1e-9);
        let disjoint = Rect::new(100.0, 100.0, 5.0, 5.0);
        assert_eq!(a.overlap_fraction(&disjoint), 0.0);
    }

    #[test]
    fn scroll_pages_below() {
        let info = ScrollInfo {
            scroll_top: 600.0,
            scroll_height: 3000.0,
            client_height: 600.0,
            ..Default::default()
        };
        assert!((info.pages_below() - 3.0).abs() < 1e-9);
        assert!(info.can_scroll_vertically());
    }

    #[test]
    fn style_visibility() {
        let mut record = LayoutRecord::default();
        assert!(record.visible_by_style());
        record.styles.insert("display".into(), "none".into());
        assert!(!record.visible_by_style());
        record.styles.insert("display".into(), "block".into());
        record.styles.insert("opacity".into(), "0".into());
        assert!(!record.visible_by_style());
    }
}
