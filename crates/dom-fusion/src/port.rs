//! Protocol port the builder fetches through. The seam exists so graph
//! construction can be tested against scripted payloads without a browser.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use pagelens_cdp_session::{PooledSession, SessionPool};
use pagelens_core_types::{FrameId, TargetId};

use crate::error::FusionError;
use crate::snapshot::REQUIRED_COMPUTED_STYLES;

/// The four raw fetches one target contributes to a fusion cycle.
#[async_trait]
pub trait FusionPort: Send + Sync {
    async fn dom_document(&self) -> Result<Value, FusionError>;
    async fn ax_tree(&self, frame_id: Option<&FrameId>) -> Result<Value, FusionError>;
    async fn capture_snapshot(&self) -> Result<Value, FusionError>;
    async fn layout_metrics(&self) -> Result<Value, FusionError>;
}

/// Yields a port per target so cross-origin iframes can be fetched through
/// their own sessions.
#[async_trait]
pub trait PortFactory: Send + Sync {
    async fn port_for(&self, target: &TargetId) -> Result<Arc<dyn FusionPort>, FusionError>;
}

pub struct SessionPort {
    session: Arc<PooledSession>,
}

impl SessionPort {
    pub fn new(session: Arc<PooledSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl FusionPort for SessionPort {
    async fn dom_document(&self) -> Result<Value, FusionError> {
        Ok(self
            .session
            .send("DOM.getDocument", json!({ "depth": -1, "pierce": true }))
            .await?)
    }

    async fn ax_tree(&self, frame_id: Option<&FrameId>) -> Result<Value, FusionError> {
        let params = match frame_id {
            Some(frame) => json!({ "frameId": frame.0 }),
            None => json!({}),
        };
        Ok(self
            .session
            .send("Accessibility.getFullAXTree", params)
            .await?)
    }

    async fn capture_snapshot(&self) -> Result<Value, FusionError> {
        Ok(self
            .session
            .send(
                "DOMSnapshot.captureSnapshot",
                json!({
                    "computedStyles": REQUIRED_COMPUTED_STYLES,
                    "includePaintOrder": true,
                    "includeDOMRects": true,
                }),
            )
            .await?)
    }

    async fn layout_metrics(&self) -> Result<Value, FusionError> {
        Ok(self.session.send("Page.getLayoutMetrics", json!({})).await?)
    }
}

/// Factory backed by the shared session pool.
pub struct PoolPortFactory {
    pool: Arc<SessionPool>,
}

impl PoolPortFactory {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PortFactory for PoolPortFactory {
    async fn port_for(&self, target: &TargetId) -> Result<Arc<dyn FusionPort>, FusionError> {
        let session = self.pool.acquire(target).await?;
        Ok(Arc::new(SessionPort::new(session)))
    }
}
