//! Per-cycle working state. Nothing here outlives one extraction pass;
//! in particular the interactive memo must never be shared across cycles,
//! since the page may have changed underneath the same backend node ids.

use std::collections::HashMap;

use pagelens_core_types::BackendNodeId;
use pagelens_dom_fusion::{EnhancedNode, FusedGraph, NodeIdx};

use crate::detect;

#[derive(Debug, Default)]
pub struct ExtractContext {
    interactive_memo: HashMap<BackendNodeId, bool>,
}

impl ExtractContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized interactive check for one node.
    pub fn is_interactive(&mut self, graph: &FusedGraph, idx: NodeIdx) -> bool {
        let node = graph.node(idx);
        if let Some(cached) = self.interactive_memo.get(&node.backend_node_id) {
            return *cached;
        }
        let verdict = detect::is_interactive(node);
        self.interactive_memo.insert(node.backend_node_id, verdict);
        verdict
    }

    pub fn is_interactive_node(&mut self, node: &EnhancedNode) -> bool {
        if let Some(cached) = self.interactive_memo.get(&node.backend_node_id) {
            return *cached;
        }
        let verdict = detect::is_interactive(node);
        self.interactive_memo.insert(node.backend_node_id, verdict);
        verdict
    }
}
