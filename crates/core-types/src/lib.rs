//! Shared identifier and frame types for the pagelens crates.
//!
//! Everything here is plain data passed between the session layer, the
//! fusion builder, and the extractor. Behavior lives in the member crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// CDP target identifier (`Target.TargetID`), stable for a target's lifetime.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CDP session identifier returned by `Target.attachToTarget`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CDP frame identifier (`Page.FrameId`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub String);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page-lifetime-stable DOM node identity (`DOM.BackendNodeId`).
///
/// Unlike `DOM.NodeId`, this survives re-fetches of the document and is the
/// key used to detect elements that appeared since the previous extraction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BackendNodeId(pub u64);

impl fmt::Display for BackendNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One browsing context in the unified frame forest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame_id: FrameId,
    /// Absent for the top frame of a target.
    pub parent_frame_id: Option<FrameId>,
    /// Target whose protocol session serves this frame's content.
    pub target_id: TargetId,
    pub url: Option<String>,
    /// True when the frame is hosted out-of-process (OOPIF) and its content
    /// must be fetched through its own session.
    pub is_cross_origin: bool,
}

impl FrameInfo {
    pub fn top(frame_id: FrameId, target_id: TargetId, url: Option<String>) -> Self {
        Self {
            frame_id,
            parent_frame_id: None,
            target_id,
            url,
            is_cross_origin: false,
        }
    }
}
