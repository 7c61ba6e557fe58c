use pagelens_cdp_session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FusionError {
    /// One of the concurrent tree fetches failed even after its retry; the
    /// graph cannot be built from a partial set.
    #[error("incomplete fetch: {what}")]
    IncompleteFetch { what: String },

    #[error("malformed protocol payload: {0}")]
    MalformedPayload(String),

    /// Cross-origin iframe nesting went past the configured depth.
    #[error("iframe depth {0} exceeds the configured maximum")]
    DepthExceeded(u32),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl FusionError {
    pub fn incomplete(what: impl Into<String>) -> Self {
        Self::IncompleteFetch { what: what.into() }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }
}
