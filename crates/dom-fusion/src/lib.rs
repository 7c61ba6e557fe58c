//! Tree fusion: joins the DOM tree, the accessibility tree, and the layout
//! snapshot of a page (and its reachable iframes) into one arena-backed
//! graph keyed by backend node id.

pub mod ax;
pub mod builder;
pub mod error;
pub mod model;
pub mod port;
pub mod snapshot;

pub use builder::{BuildOptions, GraphBuilder};
pub use error::FusionError;
pub use model::{
    AxProperty, AxRecord, EnhancedNode, FusedGraph, LayoutRecord, NodeIdx, NodeKind, Rect,
    ScrollInfo, Viewport,
};
pub use port::{FusionPort, PoolPortFactory, PortFactory, SessionPort};
pub use snapshot::{parse_snapshot, SnapshotIndex, REQUIRED_COMPUTED_STYLES};
