use pagelens_cdp_session::SessionError;
use pagelens_dom_fusion::FusionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Fusion(#[from] FusionError),

    /// An index resolved to a different element than the caller captured;
    /// the page changed since the map was produced.
    #[error("selector index {index} is stale: expected backend node {expected}, found {found}")]
    StaleTarget {
        index: u32,
        expected: u64,
        found: u64,
    },

    #[error("selector index {0} is not in the current map")]
    UnknownIndex(u32),
}
