//! Graph construction: fetch the DOM tree, accessibility tree, layout
//! snapshot, and layout metrics concurrently, then fuse them into one
//! arena keyed by backend node id.
//!
//! Cross-origin iframes are handled breadth-first through a pending queue:
//! the synchronous construction pass records iframe elements whose content
//! lives in another target, then each pending frame is fetched through its
//! own session and spliced into the arena under its iframe element.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tracing::{debug, warn};

use pagelens_core_types::{BackendNodeId, FrameId, TargetId};

use crate::ax::parse_ax_tree;
use crate::error::FusionError;
use crate::model::{AxRecord, EnhancedNode, FusedGraph, NodeIdx, NodeKind, Viewport};
use crate::port::{FusionPort, PortFactory};
use crate::snapshot::{parse_snapshot, SnapshotIndex};

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Fetch and splice out-of-process iframe documents at all. When off,
    /// the iframe element is still part of the graph, flagged cross-origin.
    pub cross_origin_iframes: bool,
    /// Maximum nesting of cross-origin iframe fetches below the main frame.
    pub max_iframe_depth: u32,
    /// Cross-origin iframes smaller than this on either axis are not
    /// descended into.
    pub cross_origin_min_px: f64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            cross_origin_iframes: true,
            max_iframe_depth: 3,
            cross_origin_min_px: 100.0,
        }
    }
}

/// One target's raw payload set, fetched concurrently with one retry each.
struct FramePayload {
    dom: Value,
    ax: HashMap<BackendNodeId, AxRecord>,
    snapshot: SnapshotIndex,
    viewport: Viewport,
}

/// Cross-origin iframe waiting for its own fetch pass.
struct PendingFrame {
    iframe_idx: NodeIdx,
    target: TargetId,
    /// Top-document coordinates of the iframe box; the child document's
    /// scroll offset is subtracted once its snapshot is in hand.
    origin: (f64, f64),
    ancestors_visible: bool,
    depth: u32,
}

pub struct GraphBuilder<'a> {
    factory: &'a dyn PortFactory,
    opts: BuildOptions,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(factory: &'a dyn PortFactory, opts: BuildOptions) -> Self {
        Self { factory, opts }
    }

    /// Build the fused graph for `target`. `frame_targets` maps discovered
    /// out-of-process frame ids to their protocol targets.
    pub async fn build(
        &self,
        target: &TargetId,
        frame_targets: &HashMap<FrameId, TargetId>,
    ) -> Result<FusedGraph, FusionError> {
        let port = self.factory.port_for(target).await?;
        let payload = fetch_frame_payload(port.as_ref()).await?;

        let root_value = payload
            .dom
            .get("root")
            .ok_or_else(|| FusionError::malformed("DOM.getDocument missing root"))?;

        let mut state = BuildState {
            nodes: Vec::new(),
            by_backend_id: HashMap::new(),
            pending: VecDeque::new(),
            frame_targets,
            opts: self.opts,
        };

        let top_scroll = doc_scroll_offset(root_value, &payload.snapshot);
        let root = state.construct(
            root_value,
            None,
            &FrameScope {
                target,
                ax: &payload.ax,
                snapshot: &payload.snapshot,
                offset: (-top_scroll.0, -top_scroll.1),
                ancestors_visible: true,
                depth: 0,
            },
            &mut HashMap::new(),
        )?;

        // Breadth-first over cross-origin frames; a frame that fails to
        // fetch is dropped from the graph, not fatal for the cycle.
        while let Some(pending) = state.pending.pop_front() {
            match self.splice_frame(&mut state, &pending).await {
                Ok(()) => {}
                Err(err) => {
                    warn!(
                        target: "dom-fusion",
                        frame_target = %pending.target,
                        ?err,
                        "dropping unreachable cross-origin frame"
                    );
                }
            }
        }

        Ok(FusedGraph {
            nodes: state.nodes,
            root,
            viewport: payload.viewport,
            by_backend_id: state.by_backend_id,
        })
    }

    async fn splice_frame(
        &self,
        state: &mut BuildState<'_>,
        pending: &PendingFrame,
    ) -> Result<(), FusionError> {
        let port = self.factory.port_for(&pending.target).await?;
        let payload = fetch_frame_payload(port.as_ref()).await?;
        let root_value = payload
            .dom
            .get("root")
            .ok_or_else(|| FusionError::malformed("DOM.getDocument missing root"))?;

        let doc_scroll = doc_scroll_offset(root_value, &payload.snapshot);
        let sub_root = state.construct(
            root_value,
            Some(pending.iframe_idx),
            &FrameScope {
                target: &pending.target,
                ax: &payload.ax,
                snapshot: &payload.snapshot,
                offset: (
                    pending.origin.0 - doc_scroll.0,
                    pending.origin.1 - doc_scroll.1,
                ),
                ancestors_visible: pending.ancestors_visible,
                depth: pending.depth,
            },
            &mut HashMap::new(),
        )?;
        state.nodes[pending.iframe_idx].content_document = Some(sub_root);
        Ok(())
    }
}

struct FrameScope<'s> {
    target: &'s TargetId,
    ax: &'s HashMap<BackendNodeId, AxRecord>,
    snapshot: &'s SnapshotIndex,
    /// Added to this document's coordinates to produce top-document
    /// viewport coordinates.
    offset: (f64, f64),
    ancestors_visible: bool,
    depth: u32,
}

struct BuildState<'a> {
    nodes: Vec<EnhancedNode>,
    by_backend_id: HashMap<BackendNodeId, NodeIdx>,
    pending: VecDeque<PendingFrame>,
    frame_targets: &'a HashMap<FrameId, TargetId>,
    opts: BuildOptions,
}

impl BuildState<'_> {
    /// Recursive construction of one document subtree. `memo` is keyed by
    /// DOM node id within one document, so a node referenced twice in the
    /// payload is materialized once.
    fn construct(
        &mut self,
        value: &Value,
        parent: Option<NodeIdx>,
        scope: &FrameScope<'_>,
        memo: &mut HashMap<i64, NodeIdx>,
    ) -> Result<NodeIdx, FusionError> {
        let node_id = value
            .get("nodeId")
            .and_then(Value::as_i64)
            .ok_or_else(|| FusionError::malformed("DOM node missing nodeId"))?;
        if let Some(existing) = memo.get(&node_id) {
            return Ok(*existing);
        }
        let backend = value
            .get("backendNodeId")
            .and_then(Value::as_u64)
            .map(BackendNodeId)
            .ok_or_else(|| FusionError::malformed("DOM node missing backendNodeId"))?;

        let kind = NodeKind::from_node_type(
            value.get("nodeType").and_then(Value::as_i64).unwrap_or(0),
        );
        let tag = if kind == NodeKind::Element {
            value
                .get("nodeName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_ascii_lowercase()
        } else {
            String::new()
        };
        let attributes = parse_attribute_pairs(value.get("attributes"));
        let frame_id = value
            .get("frameId")
            .and_then(Value::as_str)
            .map(|s| FrameId(s.to_string()));

        let layout = scope.snapshot.layout.get(&backend).cloned();
        let absolute_bounds = layout
            .as_ref()
            .and_then(|l| l.bounds)
            .map(|b| b.translated(scope.offset.0, scope.offset.1));

        let style_visible = layout
            .as_ref()
            .map(|l| l.visible_by_style())
            .unwrap_or(false);
        let has_area = absolute_bounds
            .map(|b| b.width > 0.0 && b.height > 0.0)
            .unwrap_or(false);
        let is_visible = match kind {
            NodeKind::Element => scope.ancestors_visible && style_visible && has_area,
            NodeKind::Text => scope.ancestors_visible,
            _ => scope.ancestors_visible,
        };
        // A hidden element hides everything below it; non-elements pass
        // visibility through unchanged.
        let children_ancestors_visible = match kind {
            NodeKind::Element => scope.ancestors_visible && style_visible,
            _ => scope.ancestors_visible,
        };

        let is_scrollable = layout
            .as_ref()
            .and_then(|l| l.scroll)
            .map(|s| s.can_scroll_vertically() || s.can_scroll_horizontally())
            .unwrap_or(false);

        let idx = self.nodes.len();
        self.nodes.push(EnhancedNode {
            node_id,
            backend_node_id: backend,
            kind,
            tag,
            text: value
                .get("nodeValue")
                .and_then(Value::as_str)
                .filter(|_| kind == NodeKind::Text)
                .map(str::to_string),
            attributes,
            frame_id: frame_id.clone(),
            target_id: scope.target.clone(),
            parent,
            children: Vec::new(),
            content_document: None,
            shadow_roots: Vec::new(),
            ax: scope.ax.get(&backend).cloned(),
            layout,
            absolute_bounds,
            is_visible,
            is_scrollable,
            is_cross_origin_frame: false,
            snapshot_clickable: scope.snapshot.clickable.contains(&backend),
        });
        memo.insert(node_id, idx);
        self.by_backend_id.entry(backend).or_insert(idx);

        let child_scope = FrameScope {
            ancestors_visible: children_ancestors_visible,
            ..*scope
        };

        if let Some(shadow_roots) = value.get("shadowRoots").and_then(Value::as_array) {
            for shadow in shadow_roots {
                let shadow_idx = self.construct(shadow, Some(idx), &child_scope, memo)?;
                self.nodes[idx].shadow_roots.push(shadow_idx);
            }
        }
        if let Some(children) = value.get("children").and_then(Value::as_array) {
            for child in children {
                let child_idx = self.construct(child, Some(idx), &child_scope, memo)?;
                self.nodes[idx].children.push(child_idx);
            }
        }

        if self.nodes[idx].tag == "iframe" {
            self.descend_iframe(idx, value, scope, memo)?;
        }

        Ok(idx)
    }

    fn descend_iframe(
        &mut self,
        idx: NodeIdx,
        value: &Value,
        scope: &FrameScope<'_>,
        memo: &mut HashMap<i64, NodeIdx>,
    ) -> Result<(), FusionError> {
        let bounds = self.nodes[idx].absolute_bounds;
        let iframe_visible = self.nodes[idx].is_visible;

        if let Some(content) = value.get("contentDocument") {
            // Same-process frame: the content document rides along in the
            // pierced DOM payload and shares this target's snapshot.
            let content_frame = content
                .get("frameId")
                .and_then(Value::as_str)
                .map(str::to_string);
            let doc_scroll = content_frame
                .as_deref()
                .and_then(|f| scope.snapshot.frame_scroll_offsets.get(f))
                .copied()
                .unwrap_or((0.0, 0.0));
            let origin = bounds.map(|b| (b.x, b.y)).unwrap_or(scope.offset);
            let content_scope = FrameScope {
                offset: (origin.0 - doc_scroll.0, origin.1 - doc_scroll.1),
                ancestors_visible: scope.ancestors_visible && iframe_visible,
                ..*scope
            };
            let doc_idx = self.construct(content, Some(idx), &content_scope, memo)?;
            self.nodes[idx].content_document = Some(doc_idx);
            return Ok(());
        }

        // No inline document: the frame runs out of process.
        let Some(frame_id) = self.nodes[idx].frame_id.clone() else {
            return Ok(());
        };
        let Some(target) = self.frame_targets.get(&frame_id) else {
            return Ok(());
        };
        self.nodes[idx].is_cross_origin_frame = true;

        if !self.opts.cross_origin_iframes {
            return Ok(());
        }
        if scope.depth + 1 > self.opts.max_iframe_depth {
            debug!(target: "dom-fusion", %frame_id, "iframe depth cap reached; not descending");
            return Ok(());
        }
        let large_enough = bounds
            .map(|b| {
                b.width >= self.opts.cross_origin_min_px
                    && b.height >= self.opts.cross_origin_min_px
            })
            .unwrap_or(false);
        if !iframe_visible || !large_enough {
            debug!(target: "dom-fusion", %frame_id, "skipping hidden or tiny cross-origin frame");
            return Ok(());
        }

        let origin = bounds.map(|b| (b.x, b.y)).unwrap_or((0.0, 0.0));
        self.pending.push_back(PendingFrame {
            iframe_idx: idx,
            target: target.clone(),
            origin,
            ancestors_visible: scope.ancestors_visible && iframe_visible,
            depth: scope.depth + 1,
        });
        Ok(())
    }
}

async fn fetch_frame_payload(port: &dyn FusionPort) -> Result<FramePayload, FusionError> {
    let (dom, ax_raw, snapshot_raw, metrics_raw) = tokio::join!(
        fetch_twice("DOM.getDocument", || port.dom_document()),
        fetch_twice("Accessibility.getFullAXTree", || port.ax_tree(None)),
        fetch_twice("DOMSnapshot.captureSnapshot", || port.capture_snapshot()),
        fetch_twice("Page.getLayoutMetrics", || port.layout_metrics()),
    );
    let (dom, ax_raw, snapshot_raw, metrics_raw) = (dom?, ax_raw?, snapshot_raw?, metrics_raw?);

    let viewport = parse_viewport(&metrics_raw);
    Ok(FramePayload {
        ax: parse_ax_tree(&ax_raw)?,
        snapshot: parse_snapshot(&snapshot_raw, viewport.device_pixel_ratio)?,
        dom,
        viewport,
    })
}

/// Run a fetch and retry it once before declaring the cycle incomplete.
async fn fetch_twice<F, Fut>(what: &str, fetch: F) -> Result<Value, FusionError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Value, FusionError>>,
{
    match fetch().await {
        Ok(value) => Ok(value),
        Err(first) => {
            debug!(target: "dom-fusion", what, ?first, "fetch failed; retrying once");
            fetch()
                .await
                .map_err(|err| FusionError::incomplete(format!("{what}: {err}")))
        }
    }
}

fn parse_viewport(metrics: &Value) -> Viewport {
    let css = metrics.get("cssVisualViewport");
    let device = metrics.get("visualViewport");
    let field = |obj: Option<&Value>, name: &str| obj.and_then(|o| o.get(name)).and_then(Value::as_f64);

    let width = field(css, "clientWidth").unwrap_or(1280.0);
    let height = field(css, "clientHeight").unwrap_or(720.0);
    let device_width = field(device, "clientWidth").unwrap_or(width);
    let device_pixel_ratio = if width > 0.0 { device_width / width } else { 1.0 };

    Viewport {
        width,
        height,
        scroll_x: field(css, "pageX").unwrap_or(0.0),
        scroll_y: field(css, "pageY").unwrap_or(0.0),
        device_pixel_ratio: if device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        },
    }
}

/// Scroll offset of a document's own frame, from the snapshot.
fn doc_scroll_offset(root: &Value, snapshot: &SnapshotIndex) -> (f64, f64) {
    root.get("frameId")
        .and_then(Value::as_str)
        .and_then(|f| snapshot.frame_scroll_offsets.get(f))
        .copied()
        .unwrap_or((0.0, 0.0))
}

fn parse_attribute_pairs(value: Option<&Value>) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if let Some(flat) = value.and_then(Value::as_array) {
        for pair in flat.chunks_exact(2) {
            if let (Some(name), Some(val)) = (pair[0].as_str(), pair[1].as_str()) {
                out.insert(name.to_ascii_lowercase(), val.to_string());
            }
        }
    }
    out
}
