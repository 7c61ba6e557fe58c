//! Frame discovery across a page and its out-of-process iframes.
//!
//! Same-process frames come from `Page.getFrameTree` on the page session.
//! Cross-origin iframes run as separate targets; they are attached one by
//! one, subject to an ad-host skip-list and a per-discovery attachment cap.

use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use pagelens_core_types::{FrameId, FrameInfo, TargetId};

use crate::error::SessionError;
use crate::metrics;
use crate::pool::SessionPool;

/// Outcome of one discovery pass over a page target.
#[derive(Debug, Default)]
pub struct DiscoveredFrames {
    pub frames: Vec<FrameInfo>,
    pub skipped_ad_hosts: usize,
    pub attach_cap_hit: bool,
}

impl DiscoveredFrames {
    pub fn main_frame(&self) -> Option<&FrameInfo> {
        self.frames.iter().find(|f| f.parent_frame_id.is_none())
    }

    pub fn cross_origin(&self) -> impl Iterator<Item = &FrameInfo> {
        self.frames.iter().filter(|f| f.is_cross_origin)
    }
}

pub struct FrameDiscovery<'a> {
    pool: &'a SessionPool,
}

impl<'a> FrameDiscovery<'a> {
    pub fn new(pool: &'a SessionPool) -> Self {
        Self { pool }
    }

    /// Walk the frame tree of `page_target` and attach its out-of-process
    /// iframe targets. A frame that vanishes mid-walk is skipped, not fatal.
    pub async fn discover(
        &self,
        page_target: &TargetId,
    ) -> Result<DiscoveredFrames, SessionError> {
        let mut out = DiscoveredFrames::default();

        let page = self.pool.acquire(page_target).await?;
        let tree = page.send("Page.getFrameTree", json!({})).await?;
        if let Some(root) = tree.get("frameTree") {
            collect_same_process_frames(root, None, page_target, &mut out.frames);
        }

        let targets = self
            .pool
            .transport()
            .send_command(
                crate::transport::CommandTarget::Browser,
                "Target.getTargets",
                json!({}),
            )
            .await?;

        let skiplist = &self.pool.config().ad_domain_skiplist;
        let cap = self.pool.config().max_iframe_attach;
        let mut attached = 0usize;

        for info in targets
            .get("targetInfos")
            .and_then(|v| v.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[])
        {
            if info.get("type").and_then(|v| v.as_str()) != Some("iframe") {
                continue;
            }
            let Some(target_id) = info.get("targetId").and_then(|v| v.as_str()) else {
                continue;
            };
            let url = info.get("url").and_then(|v| v.as_str()).unwrap_or("");

            if is_ad_host(url, skiplist) {
                debug!(target: "cdp-session", url, "skipping ad iframe target");
                metrics::record_frame_skipped_ad();
                out.skipped_ad_hosts += 1;
                continue;
            }
            if attached >= cap {
                metrics::record_attach_cap_hit();
                out.attach_cap_hit = true;
                debug!(target: "cdp-session", cap, "iframe attach cap reached");
                break;
            }

            let oopif_target = TargetId(target_id.to_string());
            match self.attach_oopif(&oopif_target, url).await {
                Ok(frame) => {
                    attached += 1;
                    out.frames.push(frame);
                }
                Err(err) if err.is_recoverable() => {
                    warn!(target: "cdp-session", url, ?err, "iframe target unavailable; skipping");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(out)
    }

    async fn attach_oopif(
        &self,
        target: &TargetId,
        url: &str,
    ) -> Result<FrameInfo, SessionError> {
        let session = self.pool.acquire(target).await?;
        let tree = session.send("Page.getFrameTree", json!({})).await?;
        let frame = tree
            .get("frameTree")
            .and_then(|t| t.get("frame"))
            .ok_or_else(|| SessionError::protocol("getFrameTree missing frame"))?;
        let frame_id = frame
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SessionError::protocol("frame missing id"))?;
        let parent = frame
            .get("parentId")
            .and_then(|v| v.as_str())
            .map(|s| FrameId(s.to_string()));

        Ok(FrameInfo {
            frame_id: FrameId(frame_id.to_string()),
            parent_frame_id: parent,
            target_id: target.clone(),
            url: Some(url.to_string()),
            is_cross_origin: true,
        })
    }
}

fn collect_same_process_frames(
    node: &Value,
    parent: Option<&FrameId>,
    target: &TargetId,
    out: &mut Vec<FrameInfo>,
) {
    let Some(frame) = node.get("frame") else {
        return;
    };
    let Some(id) = frame.get("id").and_then(|v| v.as_str()) else {
        return;
    };
    let frame_id = FrameId(id.to_string());
    out.push(FrameInfo {
        frame_id: frame_id.clone(),
        parent_frame_id: parent.cloned(),
        target_id: target.clone(),
        url: frame.get("url").and_then(|v| v.as_str()).map(str::to_string),
        is_cross_origin: false,
    });
    if let Some(children) = node.get("childFrames").and_then(|v| v.as_array()) {
        for child in children {
            collect_same_process_frames(child, Some(&frame_id), target, out);
        }
    }
}

/// Substring match against the host of `url`. Entries like `adsystem` are
/// deliberately partial so regional variants match too.
fn is_ad_host(url: &str, skiplist: &[String]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    skiplist.iter().any(|entry| host.contains(entry.as_str()))
}
