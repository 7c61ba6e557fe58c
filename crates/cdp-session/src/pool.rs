//! Process-wide session pool keyed by target id.
//!
//! One `PooledSession` per target. Attaching uses flat sessions
//! (`Target.attachToTarget { flatten: true }`); right after attach the pool
//! disables auto-attach on the new session, otherwise pages with many
//! iframes trigger an attachment storm of sub-targets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use pagelens_core_types::{SessionId, TargetId};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::metrics;
use crate::transport::{CdpTransport, CommandTarget, TransportEvent};

/// A live, authenticated channel to one target.
///
/// Not shareable across concurrent logical actors: session state (attached
/// frames, auto-attach settings) is not safe for concurrent mutation, so a
/// caller driving several agents must acquire one session per actor.
pub struct PooledSession {
    pub target_id: TargetId,
    pub session_id: SessionId,
    /// Whether this session has a dedicated socket (false: shares the pool's).
    pub owns_transport: bool,
    transport: Arc<dyn CdpTransport>,
    retry_backoff: Duration,
    max_retries: u32,
    attached_at: Instant,
}

impl PooledSession {
    /// Send a command on this session, retrying retriable failures with
    /// exponential backoff plus jitter, up to the configured attempt count.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        let mut attempt = 0u32;
        loop {
            let start = Instant::now();
            metrics::record_command(method);
            let result = self
                .transport
                .send_command(
                    CommandTarget::Session(self.session_id.0.clone()),
                    method,
                    params.clone(),
                )
                .await;

            match result {
                Ok(value) => {
                    metrics::record_command_success(method, start.elapsed());
                    return Ok(value);
                }
                Err(err) => {
                    metrics::record_command_failure(method);
                    if err.is_retriable() && attempt < self.max_retries {
                        let backoff = self.retry_backoff * 2u32.saturating_pow(attempt);
                        let jitter =
                            Duration::from_millis(rand::thread_rng().gen_range(0..=50));
                        debug!(
                            target: "cdp-session",
                            method,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            "retrying protocol call"
                        );
                        sleep(backoff + jitter).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    pub fn age(&self) -> Duration {
        self.attached_at.elapsed()
    }
}

/// Pool of protocol sessions, one per target, cached for reuse and
/// invalidated on navigation or target destruction.
pub struct SessionPool {
    transport: Arc<dyn CdpTransport>,
    cfg: SessionConfig,
    sessions: DashMap<TargetId, Arc<PooledSession>>,
    recent_urls: DashMap<TargetId, String>,
}

impl SessionPool {
    pub fn new(transport: Arc<dyn CdpTransport>, cfg: SessionConfig) -> Self {
        Self {
            transport,
            cfg,
            sessions: DashMap::new(),
            recent_urls: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    pub fn transport(&self) -> Arc<dyn CdpTransport> {
        Arc::clone(&self.transport)
    }

    /// Reuse the pooled session for `target` when one exists; otherwise
    /// attach and disable auto-attach on the fresh session.
    pub async fn acquire(&self, target: &TargetId) -> Result<Arc<PooledSession>, SessionError> {
        if let Some(existing) = self.sessions.get(target) {
            return Ok(Arc::clone(existing.value()));
        }

        let response = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target.0, "flatten": true }),
            )
            .await
            .map_err(|err| match err {
                // A target that disappears mid-attach is recoverable.
                SessionError::Protocol { hint, .. } if hint.contains("No target") => {
                    SessionError::FrameUnavailable(hint)
                }
                other => other,
            })?;

        let session_id = response
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SessionError::protocol("attachToTarget missing sessionId"))?
            .to_string();

        let session = Arc::new(PooledSession {
            target_id: target.clone(),
            session_id: SessionId(session_id),
            owns_transport: false,
            transport: Arc::clone(&self.transport),
            retry_backoff: Duration::from_millis(self.cfg.retry_backoff_ms),
            max_retries: self.cfg.max_retries,
            attached_at: Instant::now(),
        });

        // Stop the browser from auto-attaching this session to every
        // sub-target it spawns.
        if let Err(err) = session
            .send(
                "Target.setAutoAttach",
                json!({
                    "autoAttach": false,
                    "waitForDebuggerOnStart": false,
                    "flatten": true,
                }),
            )
            .await
        {
            warn!(target: "cdp-session", %target, ?err, "failed to disable auto-attach");
        }

        metrics::record_session_attached();
        self.sessions.insert(target.clone(), Arc::clone(&session));
        Ok(session)
    }

    /// Detach and forget the session for `target`, if any.
    pub async fn release(&self, target: &TargetId) {
        if let Some((_, session)) = self.sessions.remove(target) {
            let result = self
                .transport
                .send_command(
                    CommandTarget::Browser,
                    "Target.detachFromTarget",
                    json!({ "sessionId": session.session_id.0 }),
                )
                .await;
            if let Err(err) = result {
                debug!(target: "cdp-session", %target, ?err, "detach failed (target may be gone)");
            }
        }
    }

    /// Drop the cached session without detaching (the target navigated or
    /// died; the wire session is already invalid).
    pub fn invalidate(&self, target: &TargetId) {
        self.sessions.remove(target);
    }

    pub fn recent_url(&self, target: &TargetId) -> Option<String> {
        self.recent_urls.get(target).map(|e| e.value().clone())
    }

    pub fn live_session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drain transport events into [`Self::handle_event`] until the event
    /// stream ends. Without a running pump, navigations and target
    /// destruction go unnoticed and stale sessions keep being handed out;
    /// abort the returned handle when the pool's owner shuts down.
    pub fn spawn_event_pump(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let transport = pool.transport();
            while let Some(event) = transport.next_event().await {
                pool.handle_event(&event);
            }
            debug!(target: "cdp-session", "transport event stream ended");
        })
    }

    /// Maintain the pool from transport events.
    pub fn handle_event(&self, event: &TransportEvent) {
        match event.method.as_str() {
            "Target.targetDestroyed" => {
                if let Some(target_id) = event.params.get("targetId").and_then(|v| v.as_str()) {
                    let target = TargetId(target_id.to_string());
                    self.invalidate(&target);
                    self.recent_urls.remove(&target);
                }
            }
            "Target.detachedFromTarget" => {
                if let Some(session_id) = event.params.get("sessionId").and_then(|v| v.as_str()) {
                    self.sessions
                        .retain(|_, session| session.session_id.0 != session_id);
                }
            }
            "Target.targetInfoChanged" => {
                let info = event.params.get("targetInfo");
                let target_id = info
                    .and_then(|i| i.get("targetId"))
                    .and_then(|v| v.as_str())
                    .map(|s| TargetId(s.to_string()));
                let url = info
                    .and_then(|i| i.get("url"))
                    .and_then(|v| v.as_str())
                    .filter(|u| !u.is_empty())
                    .map(str::to_string);
                if let (Some(target), Some(url)) = (target_id, url) {
                    let changed = self
                        .recent_urls
                        .get(&target)
                        .map(|prev| *prev.value() != url)
                        .unwrap_or(false);
                    if changed {
                        // Navigation invalidates the cached session state.
                        self.invalidate(&target);
                    }
                    self.recent_urls.insert(target, url);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StubTransport;

    fn pool_with_stub() -> (SessionPool, Arc<StubTransport>) {
        let stub = Arc::new(StubTransport::new());
        stub.respond(
            "Target.attachToTarget",
            json!({ "sessionId": "sess-1" }),
        );
        stub.respond("Target.setAutoAttach", json!({}));
        stub.respond("Target.detachFromTarget", json!({}));
        let pool = SessionPool::new(stub.clone(), SessionConfig::default());
        (pool, stub)
    }

    #[tokio::test]
    async fn acquire_attaches_then_disables_auto_attach() {
        let (pool, stub) = pool_with_stub();
        let target = TargetId("t1".into());

        let session = pool.acquire(&target).await.expect("attach");
        assert_eq!(session.session_id.0, "sess-1");

        let calls = stub.recorded_calls();
        assert_eq!(calls[0].0, "Target.attachToTarget");
        assert_eq!(calls[1].0, "Target.setAutoAttach");
        // setAutoAttach must go to the new session, not the browser endpoint
        assert_eq!(calls[1].1.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn acquire_reuses_pooled_session() {
        let (pool, stub) = pool_with_stub();
        let target = TargetId("t1".into());

        let first = pool.acquire(&target).await.expect("attach");
        let second = pool.acquire(&target).await.expect("reuse");
        assert!(Arc::ptr_eq(&first, &second));
        // only one attach on the wire
        let attaches = stub
            .recorded_calls()
            .iter()
            .filter(|(m, _)| m == "Target.attachToTarget")
            .count();
        assert_eq!(attaches, 1);
    }

    #[tokio::test]
    async fn vanished_target_is_recoverable() {
        let stub = Arc::new(StubTransport::new());
        stub.respond_with("Target.attachToTarget", |_, _| {
            Err(SessionError::protocol("No target with given id found"))
        });
        let pool = SessionPool::new(stub, SessionConfig::default());

        let err = match pool.acquire(&TargetId("gone".into())).await {
            Ok(_) => panic!("attach should fail for a vanished target"),
            Err(err) => err,
        };
        assert!(matches!(err, SessionError::FrameUnavailable(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn navigation_event_invalidates_session() {
        let (pool, _stub) = pool_with_stub();
        let target = TargetId("t1".into());
        pool.acquire(&target).await.expect("attach");
        assert_eq!(pool.live_session_count(), 1);

        // first info event just records the url
        pool.handle_event(&TransportEvent {
            method: "Target.targetInfoChanged".into(),
            params: json!({ "targetInfo": { "targetId": "t1", "url": "https://a.test/" } }),
            session_id: None,
        });
        assert_eq!(pool.live_session_count(), 1);

        // a different url means navigation: cached session goes away
        pool.handle_event(&TransportEvent {
            method: "Target.targetInfoChanged".into(),
            params: json!({ "targetInfo": { "targetId": "t1", "url": "https://b.test/" } }),
            session_id: None,
        });
        assert_eq!(pool.live_session_count(), 0);
        assert_eq!(pool.recent_url(&target).as_deref(), Some("https://b.test/"));
    }

    #[tokio::test]
    async fn event_pump_retires_a_navigated_session() {
        let (pool, stub) = pool_with_stub();
        let pool = Arc::new(pool);
        let pump = pool.spawn_event_pump();
        let target = TargetId("t1".into());

        let before = pool.acquire(&target).await.expect("attach");

        for url in ["https://a.test/", "https://b.test/"] {
            stub.push_event(TransportEvent {
                method: "Target.targetInfoChanged".into(),
                params: json!({ "targetInfo": { "targetId": "t1", "url": url } }),
                session_id: None,
            });
        }
        // let the pump drain both events
        sleep(Duration::from_millis(50)).await;

        let after = pool.acquire(&target).await.expect("re-attach");
        assert!(!Arc::ptr_eq(&before, &after));
        pump.abort();
    }
}
