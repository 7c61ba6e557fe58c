//! Production transport over a live Chromium connection.
//!
//! One [`Link`] wraps one websocket connection: a driver task owns the
//! socket, correlates responses to pending commands by call id, and fans
//! events out to the pool's event pump. The transport itself only keeps
//! the current link and replaces it when it dies. Liveness is checked at
//! checkout: a link idle past the heartbeat interval gets one cheap
//! `Browser.getVersion` probe before being handed out again, so no
//! background keep-alive task is needed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::cdp::browser_protocol::target::SessionId as WireSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::launch::launch_chromium;
use crate::transport::{CdpTransport, CommandTarget, TransportEvent};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// How a transport obtains a fresh link. Tests swap this for a scripted one.
#[async_trait]
trait Connector: Send + Sync {
    async fn connect(&self, cfg: &SessionConfig) -> Result<Arc<Link>, SessionError>;
}

struct ChromiumConnector;

#[async_trait]
impl Connector for ChromiumConnector {
    async fn connect(&self, cfg: &SessionConfig) -> Result<Arc<Link>, SessionError> {
        Link::open(cfg).await.map(Arc::new)
    }
}

pub struct ChromiumTransport {
    cfg: SessionConfig,
    link: Mutex<Option<Arc<Link>>>,
    connector: Arc<dyn Connector>,
}

impl ChromiumTransport {
    pub fn new(cfg: SessionConfig) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
            connector: Arc::new(ChromiumConnector),
        }
    }

    #[cfg(test)]
    fn with_connector(cfg: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            cfg,
            link: Mutex::new(None),
            connector,
        }
    }

    /// Current link, probed for liveness when idle; reconnects when dead.
    async fn link(&self) -> Result<Arc<Link>, SessionError> {
        let mut guard = self.link.lock().await;
        if let Some(link) = guard.as_ref() {
            if link.is_open() && self.probe_if_idle(link).await {
                return Ok(Arc::clone(link));
            }
        }

        let fresh = self.connector.connect(&self.cfg).await?;
        *guard = Some(Arc::clone(&fresh));
        Ok(fresh)
    }

    async fn probe_if_idle(&self, link: &Arc<Link>) -> bool {
        if self.cfg.heartbeat_interval_ms == 0 {
            return true;
        }
        if link.idle_for() < Duration::from_millis(self.cfg.heartbeat_interval_ms) {
            return true;
        }

        let deadline =
            Duration::from_millis(self.cfg.call_deadline_ms).min(Duration::from_secs(5));
        match link
            .issue(CommandTarget::Browser, "Browser.getVersion", json!({}), deadline)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!(target: "cdp-session", ?err, "idle link failed its probe; reconnecting");
                link.close();
                false
            }
        }
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), SessionError> {
        let link = self.link().await?;
        link.issue(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
            Duration::from_millis(self.cfg.call_deadline_ms),
        )
        .await?;
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        match self.link().await {
            Ok(link) => link.next_event().await,
            Err(err) => {
                warn!(target: "cdp-session", ?err, "transport not ready");
                None
            }
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        let link = self.link().await?;
        link.issue(
            target,
            method,
            params,
            Duration::from_millis(self.cfg.call_deadline_ms),
        )
        .await
    }
}

struct Issued {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: oneshot::Sender<Result<Value, SessionError>>,
}

/// One live websocket connection plus the task driving it.
struct Link {
    command_tx: mpsc::Sender<Issued>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    driver: JoinHandle<()>,
    child: std::sync::Mutex<Option<Child>>,
    open: Arc<AtomicBool>,
    started: Instant,
    /// Milliseconds since `started` of the last successful command.
    last_traffic_ms: AtomicU64,
}

impl Link {
    async fn open(cfg: &SessionConfig) -> Result<Self, SessionError> {
        let (child, ws_url) = match cfg.websocket_url.clone() {
            Some(url) => (None, url),
            None => {
                let launched = launch_chromium(cfg).await?;
                (Some(launched.child), launched.ws_url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| SessionError::fatal(err.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let open = Arc::new(AtomicBool::new(true));
        let driver = tokio::spawn(drive(conn, command_rx, event_tx, Arc::clone(&open)));

        info!(target: "cdp-session", url = %ws_url, "chromium connection established");

        Ok(Self {
            command_tx,
            events: Mutex::new(events),
            driver,
            child: std::sync::Mutex::new(child),
            open,
            started: Instant::now(),
            last_traffic_ms: AtomicU64::new(0),
        })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_traffic_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    fn touch(&self) {
        self.last_traffic_ms
            .store(self.started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    async fn issue(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let issued = Issued {
            target,
            method: method.to_string(),
            params,
            reply: reply_tx,
        };

        if self.command_tx.send(issued).await.is_err() {
            self.close();
            return Err(SessionError::fatal("transport driver is gone"));
        }

        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(Ok(value))) => {
                self.touch();
                Ok(value)
            }
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => {
                self.close();
                Err(SessionError::fatal("command reply channel closed"))
            }
            Err(_) => Err(SessionError::Timeout(format!("{method} timed out"))),
        }
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    #[cfg(test)]
    fn scripted(reply: Result<Value, SessionError>) -> Arc<Self> {
        let (command_tx, mut command_rx) = mpsc::channel::<Issued>(8);
        let (_event_tx, events) = mpsc::channel(8);
        let driver = tokio::spawn(async move {
            while let Some(issued) = command_rx.recv().await {
                let _ = issued.reply.send(reply.clone());
            }
        });
        Arc::new(Self {
            command_tx,
            events: Mutex::new(events),
            driver,
            child: std::sync::Mutex::new(None),
            open: Arc::new(AtomicBool::new(true)),
            started: Instant::now(),
            last_traffic_ms: AtomicU64::new(0),
        })
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.close();
        self.driver.abort();
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut child) = guard.take() {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        if let Err(err) = child.kill().await {
                            warn!(target: "cdp-session", ?err, "failed to kill chromium child");
                        }
                    });
                } else {
                    debug!(target: "cdp-session", "no runtime available to kill chromium child");
                }
            }
        }
    }
}

async fn drive(
    mut conn: Connection<CdpEventMessage>,
    mut commands: mpsc::Receiver<Issued>,
    events: mpsc::Sender<TransportEvent>,
    open: Arc<AtomicBool>,
) {
    let mut pending: HashMap<CallId, oneshot::Sender<Result<Value, SessionError>>> =
        HashMap::new();

    loop {
        tokio::select! {
            issued = commands.recv() => {
                // The transport was dropped; nothing left to serve.
                let Some(issued) = issued else { break };
                let session = match issued.target {
                    CommandTarget::Browser => None,
                    CommandTarget::Session(id) => Some(WireSessionId::from(id)),
                };
                let method: MethodId = issued.method.into();
                match conn.submit_command(method, session, issued.params) {
                    Ok(call_id) => {
                        pending.insert(call_id, issued.reply);
                    }
                    Err(err) => {
                        // A malformed submit fails one command, not the link.
                        let _ = issued
                            .reply
                            .send(Err(SessionError::protocol(err.to_string())));
                    }
                }
            }
            frame = conn.next() => match frame {
                Some(Ok(Message::Response(resp))) => {
                    if let Some(reply) = pending.remove(&resp.id) {
                        let _ = reply.send(decode_response(resp));
                    }
                }
                Some(Ok(Message::Event(event))) => {
                    forward_event(&events, event);
                }
                Some(Err(err)) => {
                    fail_pending(&mut pending, classify_wire_error(err));
                    break;
                }
                None => {
                    fail_pending(&mut pending, SessionError::fatal("cdp connection closed"));
                    break;
                }
            }
        }
    }

    open.store(false, Ordering::Relaxed);
}

fn fail_pending(
    pending: &mut HashMap<CallId, oneshot::Sender<Result<Value, SessionError>>>,
    err: SessionError,
) {
    warn!(target: "cdp-session", ?err, inflight = pending.len(), "link failed");
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(err.clone()));
    }
}

fn forward_event(events: &mpsc::Sender<TransportEvent>, event: CdpEventMessage) {
    let raw: CdpJsonEventMessage = match event.try_into() {
        Ok(raw) => raw,
        Err(err) => {
            debug!(target: "cdp-session", ?err, "undecodable cdp event");
            return;
        }
    };
    deliver_event(
        events,
        TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        },
    );
}

/// Never blocks: a stalled event reader must not wedge command dispatch,
/// so overflow drops the event instead of suspending the driver.
fn deliver_event(events: &mpsc::Sender<TransportEvent>, event: TransportEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(target: "cdp-session", method = %event.method, "event buffer full; dropping event");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

fn decode_response(resp: Response) -> Result<Value, SessionError> {
    if let Some(result) = resp.result {
        Ok(result)
    } else if let Some(error) = resp.error {
        Err(SessionError::Protocol {
            hint: format!("cdp error {}: {}", error.code, error.message),
            retriable: error.code >= 500,
        })
    } else {
        Err(SessionError::protocol("empty cdp response"))
    }
}

fn classify_wire_error(err: CdpError) -> SessionError {
    let hint = err.to_string();
    match err {
        CdpError::Timeout => SessionError::Timeout(hint),
        CdpError::FrameNotFound(_) => SessionError::FrameUnavailable(hint),
        CdpError::JavascriptException(_) | CdpError::Serde(_) => SessionError::protocol(hint),
        _ => SessionError::fatal(hint),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedConnector {
        connects: AtomicUsize,
        reply: Result<Value, SessionError>,
    }

    impl ScriptedConnector {
        fn new(reply: Result<Value, SessionError>) -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                reply,
            })
        }

        fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _cfg: &SessionConfig) -> Result<Arc<Link>, SessionError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Link::scripted(self.reply.clone()))
        }
    }

    fn cfg_with_heartbeat(ms: u64) -> SessionConfig {
        SessionConfig {
            heartbeat_interval_ms: ms,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn closed_link_is_replaced_on_next_checkout() {
        let connector = ScriptedConnector::new(Ok(json!({})));
        let transport =
            ChromiumTransport::with_connector(cfg_with_heartbeat(0), connector.clone());

        let first = transport.link().await.expect("first link");
        first.close();
        let second = transport.link().await.expect("second link");

        assert_eq!(connector.connect_count(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn healthy_idle_link_is_probed_and_reused() {
        let connector = ScriptedConnector::new(Ok(json!({ "product": "Chrome" })));
        let transport =
            ChromiumTransport::with_connector(cfg_with_heartbeat(1), connector.clone());

        let first = transport.link().await.expect("first link");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = transport.link().await.expect("probed link");

        assert_eq!(connector.connect_count(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failed_probe_forces_a_reconnect() {
        let connector =
            ScriptedConnector::new(Err(SessionError::fatal("browser went away")));
        let transport =
            ChromiumTransport::with_connector(cfg_with_heartbeat(1), connector.clone());

        let first = transport.link().await.expect("first link");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = transport.link().await.expect("replacement link");

        assert_eq!(connector.connect_count(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!first.is_open());
    }

    #[tokio::test]
    async fn event_overflow_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel::<TransportEvent>(2);
        for i in 0..5 {
            deliver_event(
                &tx,
                TransportEvent {
                    method: format!("Page.event{i}"),
                    params: json!({}),
                    session_id: None,
                },
            );
        }

        assert_eq!(rx.recv().await.expect("first").method, "Page.event0");
        assert_eq!(rx.recv().await.expect("second").method, "Page.event1");
        assert!(rx.try_recv().is_err());
    }
}
