//! Extraction engine: one call drives frame discovery, tree fusion,
//! simplification, indexing, and rendering for a page target.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use pagelens_cdp_session::{CdpTransport, FrameDiscovery, SessionConfig, SessionPool};
use pagelens_core_types::{BackendNodeId, FrameId, TargetId};
use pagelens_dom_fusion::{BuildOptions, FusedGraph, GraphBuilder, PoolPortFactory};
use pagelens_state_extractor::{
    assign_indices, render, simplify, ExtractContext, ExtractorPolicy, SelectorHandle,
    SelectorMap,
};

use crate::errors::EngineError;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub session: SessionConfig,
    pub build: BuildOptions,
    pub policy: ExtractorPolicy,
}

/// Result of one extraction cycle. The graph is kept alongside the map so
/// callers can inspect the nodes an index points at.
pub struct Extraction {
    pub root: FusedGraph,
    pub selector_map: SelectorMap,
    pub rendered: String,
}

impl Extraction {
    /// Re-validate an index before acting on it. The caller passes the
    /// backend node id it captured when the map was produced; a mismatch
    /// means the page changed and the index must not be trusted.
    pub fn resolve(
        &self,
        index: u32,
        expected: BackendNodeId,
    ) -> Result<&SelectorHandle, EngineError> {
        let handle = self
            .selector_map
            .get(index)
            .ok_or(EngineError::UnknownIndex(index))?;
        if handle.backend_node_id != expected {
            return Err(EngineError::StaleTarget {
                index,
                expected: expected.0,
                found: handle.backend_node_id.0,
            });
        }
        Ok(handle)
    }
}

pub struct Engine {
    pool: Arc<SessionPool>,
    factory: PoolPortFactory,
    build: BuildOptions,
    policy: ExtractorPolicy,
    previous_maps: DashMap<TargetId, SelectorMap>,
    /// Keeps pooled sessions honest: navigations and destroyed targets seen
    /// on the wire retire their cached session.
    event_pump: tokio::task::JoinHandle<()>,
}

impl Engine {
    /// Must be called within a tokio runtime; the engine starts a background
    /// task that feeds transport events into the session pool.
    pub fn new(transport: Arc<dyn CdpTransport>, config: EngineConfig) -> Self {
        let pool = Arc::new(SessionPool::new(transport, config.session));
        Self::with_pool(pool, config.build, config.policy)
    }

    pub fn with_pool(
        pool: Arc<SessionPool>,
        build: BuildOptions,
        policy: ExtractorPolicy,
    ) -> Self {
        let event_pump = pool.spawn_event_pump();
        Self {
            factory: PoolPortFactory::new(Arc::clone(&pool)),
            pool,
            build,
            policy,
            previous_maps: DashMap::new(),
            event_pump,
        }
    }

    pub fn pool(&self) -> Arc<SessionPool> {
        Arc::clone(&self.pool)
    }

    /// Run one extraction cycle for `target`.
    pub async fn extract(&self, target: &TargetId) -> Result<Extraction, EngineError> {
        let discovered = FrameDiscovery::new(&self.pool).discover(target).await?;
        let frame_targets: HashMap<FrameId, TargetId> = discovered
            .cross_origin()
            .map(|f| (f.frame_id.clone(), f.target_id.clone()))
            .collect();
        debug!(
            target: "pagelens",
            %target,
            frames = discovered.frames.len(),
            cross_origin = frame_targets.len(),
            "frames discovered"
        );

        let graph = GraphBuilder::new(&self.factory, self.build)
            .build(target, &frame_targets)
            .await?;

        let mut ctx = ExtractContext::new();
        let (selector_map, rendered) = match simplify(&graph, &self.policy, &mut ctx) {
            Some(mut root) => {
                let previous = self.previous_maps.get(target).map(|e| e.value().clone());
                let map = assign_indices(&mut root, &graph, previous.as_ref());
                let rendered = render(&root, &graph, &self.policy);
                (map, rendered)
            }
            None => (SelectorMap::default(), String::new()),
        };

        info!(
            target: "pagelens",
            %target,
            nodes = graph.nodes.len(),
            interactive = selector_map.len(),
            "extraction cycle complete"
        );
        self.previous_maps
            .insert(target.clone(), selector_map.clone());
        Ok(Extraction {
            root: graph,
            selector_map,
            rendered,
        })
    }

    /// Drop cached per-target state (previous map and pooled session).
    pub async fn forget_target(&self, target: &TargetId) {
        self.previous_maps.remove(target);
        self.pool.release(target).await;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.event_pump.abort();
    }
}
