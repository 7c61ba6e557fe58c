//! Index assignment: every interactive survivor gets a dense 1..=N index
//! in pre-order, and the resulting map is diffed against the previous
//! cycle to mark elements the page just grew.

use std::collections::{BTreeMap, HashSet};

use pagelens_core_types::{BackendNodeId, FrameId, TargetId};
use pagelens_dom_fusion::{FusedGraph, NodeIdx};
use serde::Serialize;

use crate::simplify::SimplifiedNode;

/// What a caller needs to act on an index later: enough identity to
/// re-resolve the node and to detect that the page moved underneath it.
#[derive(Debug, Clone, Serialize)]
pub struct SelectorHandle {
    pub backend_node_id: BackendNodeId,
    pub target_id: TargetId,
    pub frame_id: Option<FrameId>,
    pub node: NodeIdx,
    pub tag: String,
    pub is_new: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SelectorMap {
    entries: BTreeMap<u32, SelectorHandle>,
    backend_ids: HashSet<BackendNodeId>,
}

impl SelectorMap {
    pub fn get(&self, index: u32) -> Option<&SelectorHandle> {
        self.entries.get(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_backend(&self, id: BackendNodeId) -> bool {
        self.backend_ids.contains(&id)
    }

    /// Ascending (index, handle) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &SelectorHandle)> {
        self.entries.iter().map(|(i, h)| (*i, h))
    }

    fn insert(&mut self, index: u32, handle: SelectorHandle) {
        self.backend_ids.insert(handle.backend_node_id);
        self.entries.insert(index, handle);
    }
}

/// Single pre-order pass: assigns 1..=N to interactive nodes and marks a
/// node new iff its backend id is absent from `previous`. With no previous
/// map (first cycle) nothing is marked new.
pub fn assign_indices(
    root: &mut SimplifiedNode,
    graph: &FusedGraph,
    previous: Option<&SelectorMap>,
) -> SelectorMap {
    let mut map = SelectorMap::default();
    let mut next = 1u32;
    assign(root, graph, previous, &mut map, &mut next);
    map
}

fn assign(
    node: &mut SimplifiedNode,
    graph: &FusedGraph,
    previous: Option<&SelectorMap>,
    map: &mut SelectorMap,
    next: &mut u32,
) {
    if node.is_interactive {
        let fused = graph.node(node.node);
        let is_new = previous
            .map(|p| !p.contains_backend(fused.backend_node_id))
            .unwrap_or(false);
        node.interactive_index = Some(*next);
        node.is_new = is_new;
        map.insert(
            *next,
            SelectorHandle {
                backend_node_id: fused.backend_node_id,
                target_id: fused.target_id.clone(),
                frame_id: fused.frame_id.clone(),
                node: node.node,
                tag: fused.tag.clone(),
                is_new,
            },
        );
        *next += 1;
    }
    for child in &mut node.children {
        assign(child, graph, previous, map, next);
    }
}
