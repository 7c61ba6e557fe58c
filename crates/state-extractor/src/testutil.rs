//! Hand-built graph fixtures for extractor tests.

use std::collections::HashMap;

use pagelens_core_types::{BackendNodeId, TargetId};
use pagelens_dom_fusion::{
    AxProperty, AxRecord, EnhancedNode, FusedGraph, LayoutRecord, NodeIdx, NodeKind, Rect,
    ScrollInfo, Viewport,
};

pub struct GraphFixture {
    nodes: Vec<EnhancedNode>,
    next_backend: u64,
}

impl GraphFixture {
    /// Starts with a #document root at index 0.
    pub fn new() -> Self {
        let mut fixture = Self {
            nodes: Vec::new(),
            next_backend: 1,
        };
        fixture.push(NodeKind::Document, "", None, None);
        fixture
    }

    fn push(
        &mut self,
        kind: NodeKind,
        tag: &str,
        text: Option<&str>,
        parent: Option<NodeIdx>,
    ) -> NodeIdx {
        let idx = self.nodes.len();
        let backend = BackendNodeId(self.next_backend);
        self.next_backend += 1;
        self.nodes.push(EnhancedNode {
            node_id: idx as i64 + 1,
            backend_node_id: backend,
            kind,
            tag: tag.to_string(),
            text: text.map(str::to_string),
            attributes: HashMap::new(),
            frame_id: None,
            target_id: TargetId("t-test".into()),
            parent,
            children: Vec::new(),
            content_document: None,
            shadow_roots: Vec::new(),
            ax: None,
            layout: Some(LayoutRecord::default()),
            absolute_bounds: Some(Rect::new(0.0, 0.0, 100.0, 20.0)),
            is_visible: true,
            is_scrollable: false,
            is_cross_origin_frame: false,
            snapshot_clickable: false,
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(idx);
        }
        idx
    }

    pub fn element(&mut self, parent: NodeIdx, tag: &str) -> NodeIdx {
        self.push(NodeKind::Element, tag, None, Some(parent))
    }

    pub fn text(&mut self, parent: NodeIdx, content: &str) -> NodeIdx {
        self.push(NodeKind::Text, "", Some(content), Some(parent))
    }

    /// Element plus an AX record in one call.
    pub fn widget(&mut self, parent: NodeIdx, tag: &str, role: &str, name: &str) -> NodeIdx {
        let idx = self.element(parent, tag);
        self.set_ax(idx, role, Some(name));
        idx
    }

    pub fn content_document(&mut self, iframe: NodeIdx) -> NodeIdx {
        let idx = self.push(NodeKind::Document, "", None, Some(iframe));
        // a content document hangs off the iframe, not its child list
        self.nodes[iframe].children.retain(|c| *c != idx);
        self.nodes[iframe].content_document = Some(idx);
        idx
    }

    pub fn shadow_root(&mut self, host: NodeIdx) -> NodeIdx {
        let idx = self.push(NodeKind::Other(11), "", None, Some(host));
        self.nodes[host].children.retain(|c| *c != idx);
        self.nodes[host].shadow_roots.push(idx);
        idx
    }

    pub fn set_ax(&mut self, idx: NodeIdx, role: &str, name: Option<&str>) {
        self.nodes[idx].ax = Some(AxRecord {
            role: Some(role.to_string()),
            name: name.map(str::to_string),
            ..Default::default()
        });
    }

    pub fn set_ax_property(&mut self, idx: NodeIdx, name: &str, value: serde_json::Value) {
        let ax = self.nodes[idx].ax.get_or_insert_with(AxRecord::default);
        ax.properties.push(AxProperty {
            name: name.to_string(),
            value,
        });
    }

    pub fn set_attr(&mut self, idx: NodeIdx, name: &str, value: &str) {
        self.nodes[idx]
            .attributes
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_bounds(&mut self, idx: NodeIdx, rect: Rect) {
        self.nodes[idx].absolute_bounds = Some(rect);
    }

    pub fn set_invisible(&mut self, idx: NodeIdx) {
        self.nodes[idx].is_visible = false;
    }

    pub fn set_scrollable(&mut self, idx: NodeIdx, info: ScrollInfo) {
        self.nodes[idx].is_scrollable = true;
        if let Some(layout) = &mut self.nodes[idx].layout {
            layout.scroll = Some(info);
        }
    }

    pub fn set_paint_order(&mut self, idx: NodeIdx, order: u32) {
        if let Some(layout) = &mut self.nodes[idx].layout {
            layout.paint_order = Some(order);
        }
    }

    pub fn set_style(&mut self, idx: NodeIdx, name: &str, value: &str) {
        if let Some(layout) = &mut self.nodes[idx].layout {
            layout.styles.insert(name.to_string(), value.to_string());
        }
    }

    pub fn backend_id(&self, idx: NodeIdx) -> BackendNodeId {
        self.nodes[idx].backend_node_id
    }

    pub fn build(self) -> FusedGraph {
        let by_backend_id = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.backend_node_id, idx))
            .collect();
        FusedGraph {
            nodes: self.nodes,
            root: 0,
            viewport: Viewport::default(),
            by_backend_id,
        }
    }
}
