//! Tree simplification: keep what an agent can act on or read, splice out
//! everything else, preserving document order.

use pagelens_dom_fusion::{FusedGraph, NodeIdx, NodeKind};
use tracing::trace;

use crate::context::ExtractContext;
use crate::geometry::passes_geometry;
use crate::metrics;
use crate::paint_order::PaintOrderFilter;
use crate::policy::ExtractorPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    None,
    Iframe,
    Shadow,
}

/// A surviving node of the simplified tree. Indices still point into the
/// fused graph arena; the simplified tree only re-wires structure.
#[derive(Debug)]
pub struct SimplifiedNode {
    pub node: NodeIdx,
    pub children: Vec<SimplifiedNode>,
    pub is_interactive: bool,
    /// Assigned later, in a separate pre-order pass.
    pub interactive_index: Option<u32>,
    pub is_new: bool,
    pub boundary: Boundary,
}

impl SimplifiedNode {
    fn leaf(node: NodeIdx) -> Self {
        Self {
            node,
            children: Vec::new(),
            is_interactive: false,
            interactive_index: None,
            is_new: false,
            boundary: Boundary::None,
        }
    }

    /// Count of nodes in this subtree, self included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(SimplifiedNode::size).sum::<usize>()
    }
}

pub fn simplify(
    graph: &FusedGraph,
    policy: &ExtractorPolicy,
    ctx: &mut ExtractContext,
) -> Option<SimplifiedNode> {
    let paint = policy
        .paint_order_filtering
        .then(|| PaintOrderFilter::new(graph));
    let mut pass = SimplifyPass {
        graph,
        policy,
        ctx,
        paint,
    };
    let mut survivors = pass.build(graph.root, false);
    match survivors.len() {
        0 => None,
        1 => survivors.pop(),
        // Several top-level survivors keep the document node as their
        // container; the serializer renders it transparently.
        _ => Some(SimplifiedNode {
            children: survivors,
            ..SimplifiedNode::leaf(graph.root)
        }),
    }
}

struct SimplifyPass<'a> {
    graph: &'a FusedGraph,
    policy: &'a ExtractorPolicy,
    ctx: &'a mut ExtractContext,
    paint: Option<PaintOrderFilter>,
}

impl SimplifyPass<'_> {
    /// Bottom-up: returns the survivors of the subtree rooted at `idx`.
    /// A node that is not meaningful itself is spliced out and its
    /// surviving children promoted in document order.
    fn build(&mut self, idx: NodeIdx, embedded: bool) -> Vec<SimplifiedNode> {
        let node = self.graph.node(idx);
        metrics::record_node_considered();

        let mut children = Vec::new();
        for shadow in &node.shadow_roots {
            children.extend(self.build(*shadow, true));
        }
        let shadow_survivors = children.len();
        for child in &node.children {
            children.extend(self.build(*child, embedded));
        }
        if let Some(doc) = node.content_document {
            children.extend(self.build(doc, true));
        }

        let interactive = node.kind == NodeKind::Element
            && self.ctx.is_interactive(self.graph, idx)
            && passes_geometry(node, &self.graph.viewport, self.policy, embedded)
            && !self.occluded(idx);
        let scroll_keep = node.kind == NodeKind::Element && node.is_scrollable && node.is_visible;
        let text_keep = node.is_text()
            && node.is_visible
            && node
                .trimmed_text()
                .map(|t| t.chars().count())
                .unwrap_or(0)
                > 1;
        let iframe_keep = node.tag == "iframe" && node.content_document.is_some();
        // Only survivors from inside the shadow trees make this a boundary;
        // light-DOM children surviving alone do not.
        let shadow_host = shadow_survivors > 0;

        if !(interactive || scroll_keep || text_keep || iframe_keep || shadow_host) {
            // Spliced: children take this node's place.
            return children;
        }

        if interactive {
            metrics::record_interactive_kept();
            // Text children repeating the accessible name add nothing.
            if let Some(name) = node.ax_name() {
                children.retain(|child| {
                    let child_node = self.graph.node(child.node);
                    !(child_node.is_text()
                        && child.children.is_empty()
                        && child_node.trimmed_text() == Some(name.trim()))
                });
            }
        }

        let boundary = if iframe_keep {
            Boundary::Iframe
        } else if shadow_host {
            Boundary::Shadow
        } else {
            Boundary::None
        };
        trace!(target: "state-extractor", idx, tag = %node.tag, interactive, "keeping node");
        vec![SimplifiedNode {
            node: idx,
            children,
            is_interactive: interactive,
            interactive_index: None,
            is_new: false,
            boundary,
        }]
    }

    fn occluded(&self, idx: NodeIdx) -> bool {
        match &self.paint {
            Some(filter) => {
                let hit = filter.occluded(self.graph, idx);
                if hit {
                    metrics::record_occluded_dropped();
                }
                hit
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::GraphFixture;
    use pagelens_dom_fusion::Rect;

    fn run(graph: &FusedGraph) -> Option<SimplifiedNode> {
        simplify(graph, &ExtractorPolicy::default(), &mut ExtractContext::new())
    }

    fn tags(graph: &FusedGraph, node: &SimplifiedNode) -> Vec<String> {
        let mut out = vec![graph.node(node.node).tag.clone()];
        for child in &node.children {
            out.extend(tags(graph, child));
        }
        out
    }

    #[test]
    fn wrappers_are_spliced_and_children_promoted_in_order() {
        // body > div > (button, a) with the div carrying no signal
        let mut fx = GraphFixture::new();
        let html = fx.element(0, "html");
        let body = fx.element(html, "body");
        let wrapper = fx.element(body, "div");
        let button = fx.widget(wrapper, "button", "button", "Go");
        fx.set_bounds(button, Rect::new(0.0, 0.0, 80.0, 30.0));
        let link = fx.element(wrapper, "a");
        fx.set_attr(link, "href", "/next");
        fx.set_bounds(link, Rect::new(0.0, 40.0, 80.0, 30.0));
        let graph = fx.build();

        let root = run(&graph).expect("survivors");
        // html/body/div all spliced away, document container on top
        let rendered_tags = tags(&graph, &root);
        assert_eq!(rendered_tags, vec!["", "button", "a"]);
        assert!(root.children[0].is_interactive);
        assert!(root.children[1].is_interactive);
    }

    #[test]
    fn deep_generic_nesting_collapses_to_the_leaf_widget() {
        let mut fx = GraphFixture::new();
        let mut parent = fx.element(0, "html");
        parent = fx.element(parent, "body");
        for _ in 0..6 {
            parent = fx.element(parent, "div");
        }
        let button = fx.widget(parent, "button", "button", "Deep");
        let graph = fx.build();

        let root = run(&graph).expect("survivors");
        assert_eq!(root.node, button);
        assert_eq!(root.size(), 1);
    }

    #[test]
    fn visible_text_survives_and_single_chars_do_not() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        fx.text(body, "Checkout total: 42 EUR");
        fx.text(body, "·");
        fx.text(body, "   ");
        let graph = fx.build();

        let root = run(&graph).expect("survivors");
        assert_eq!(root.size(), 1);
        assert_eq!(
            graph.node(root.node).trimmed_text(),
            Some("Checkout total: 42 EUR")
        );
    }

    #[test]
    fn interactive_node_drops_text_child_matching_its_name() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let button = fx.widget(body, "button", "button", "Submit");
        fx.text(button, "Submit");
        let other = fx.widget(body, "button", "button", "Cancel");
        fx.text(other, "Cancel order now");
        let graph = fx.build();

        let root = run(&graph).expect("survivors");
        assert_eq!(root.children.len(), 2);
        assert!(root.children[0].children.is_empty());
        assert_eq!(root.children[1].children.len(), 1);
    }

    #[test]
    fn hidden_interactives_are_pruned_with_their_subtrees() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let menu = fx.element(body, "div");
        fx.set_invisible(menu);
        let item = fx.widget(menu, "button", "button", "Hidden");
        fx.set_invisible(item);
        let visible = fx.widget(body, "button", "button", "Shown");
        let graph = fx.build();

        let root = run(&graph).expect("survivors");
        assert_eq!(root.node, visible);
    }

    #[test]
    fn iframe_boundary_is_kept_with_its_content() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let iframe = fx.element(body, "iframe");
        let doc = fx.content_document(iframe);
        let inner_body = fx.element(doc, "body");
        // far outside the viewport, but embedded contexts are exempt
        let inner_button = fx.widget(inner_body, "button", "button", "Inside");
        fx.set_bounds(inner_button, Rect::new(0.0, 4000.0, 80.0, 30.0));
        let graph = fx.build();

        let root = run(&graph).expect("survivors");
        assert_eq!(root.node, iframe);
        assert_eq!(root.boundary, Boundary::Iframe);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].node, inner_button);
    }

    #[test]
    fn shadow_boundary_requires_shadow_tree_survivors() {
        // host has an empty shadow root; its surviving child is light DOM,
        // so the host is spliced and no shadow boundary is emitted
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let host = fx.element(body, "my-card");
        fx.shadow_root(host);
        let button = fx.widget(host, "button", "button", "Light");
        let graph = fx.build();

        let root = run(&graph).expect("survivors");
        assert_eq!(root.node, button);
        assert_eq!(root.boundary, Boundary::None);
    }

    #[test]
    fn host_with_surviving_shadow_content_is_a_shadow_boundary() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let host = fx.element(body, "my-card");
        let shadow = fx.shadow_root(host);
        let inner = fx.widget(shadow, "button", "button", "Inside");
        let graph = fx.build();

        let root = run(&graph).expect("survivors");
        assert_eq!(root.node, host);
        assert_eq!(root.boundary, Boundary::Shadow);
        assert_eq!(root.children[0].node, inner);
    }

    #[test]
    fn occluded_widget_is_dropped() {
        let mut fx = GraphFixture::new();
        let body = fx.element(0, "body");
        let button = fx.widget(body, "button", "button", "Behind");
        fx.set_bounds(button, Rect::new(10.0, 10.0, 50.0, 20.0));
        fx.set_paint_order(button, 3);
        let overlay = fx.element(body, "div");
        fx.set_bounds(overlay, Rect::new(0.0, 0.0, 500.0, 400.0));
        fx.set_paint_order(overlay, 9);
        let graph = fx.build();

        assert!(run(&graph).is_none());
    }
}
