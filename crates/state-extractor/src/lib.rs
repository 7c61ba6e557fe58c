//! State extraction over a fused graph: interactive detection, geometric
//! and occlusion filtering, tree simplification, dense index assignment,
//! and serialization to indexed text.

pub mod context;
pub mod detect;
pub mod geometry;
pub mod index;
pub mod metrics;
pub mod paint_order;
pub mod policy;
pub mod serialize;
pub mod simplify;

#[cfg(test)]
mod testutil;

pub use context::ExtractContext;
pub use detect::is_interactive;
pub use geometry::passes_geometry;
pub use index::{assign_indices, SelectorHandle, SelectorMap};
pub use paint_order::PaintOrderFilter;
pub use policy::{ExtractorPolicy, DEFAULT_ATTRIBUTE_ALLOWLIST};
pub use serialize::render;
pub use simplify::{simplify, Boundary, SimplifiedNode};
