//! pagelens — browser state extraction for LLM agents.
//!
//! Drives a Chromium instance over the DevTools protocol, fuses the DOM
//! tree, accessibility tree, and layout snapshot into one graph, detects
//! the elements an agent can act on, and serializes the result as compact
//! indexed text. See the member crates:
//!
//! - `pagelens-cdp-session`: transport, session pool, frame discovery
//! - `pagelens-dom-fusion`: the three-tree fusion into an arena graph
//! - `pagelens-state-extractor`: detection, filtering, indexing, rendering

pub mod engine;
pub mod errors;

pub use engine::{Engine, EngineConfig, Extraction};
pub use errors::EngineError;

pub use pagelens_cdp_session as session;
pub use pagelens_core_types as types;
pub use pagelens_dom_fusion as fusion;
pub use pagelens_state_extractor as extractor;

/// Register every pagelens metric family on one registry.
pub fn register_metrics(registry: &prometheus::Registry) {
    pagelens_cdp_session::metrics::register_metrics(registry);
    pagelens_state_extractor::metrics::register_metrics(registry);
}
