//! The wire seam of the session layer.
//!
//! Everything above this module speaks [`CdpTransport`]: the pool, frame
//! discovery, and the fusion ports. The production implementation lives in
//! [`crate::chromium`]; tests script a [`StubTransport`] instead.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SessionError;

/// One decoded protocol event with its originating session, if any.
#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

/// Where a command is addressed: the browser endpoint or a flat session.
#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), SessionError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError>;
}

/// Transport used when no browser is reachable; every command fails.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, SessionError> {
        Err(SessionError::fatal(format!(
            "no transport available for method {method}"
        )))
    }
}

type StubHandler =
    Box<dyn Fn(Option<&str>, &Value) -> Result<Value, SessionError> + Send + Sync>;

/// Scriptable transport for tests: canned responses per method, plus a queue
/// of events the test can inject.
#[derive(Default)]
pub struct StubTransport {
    handlers: std::sync::Mutex<HashMap<String, StubHandler>>,
    events: std::sync::Mutex<Vec<TransportEvent>>,
    calls: std::sync::Mutex<Vec<(String, Option<String>)>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixed JSON response for a method.
    pub fn respond(&self, method: &str, payload: Value) {
        self.respond_with(method, move |_, _| Ok(payload.clone()));
    }

    /// Register a handler receiving `(session_id, params)`.
    pub fn respond_with<F>(&self, method: &str, handler: F)
    where
        F: Fn(Option<&str>, &Value) -> Result<Value, SessionError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .expect("stub handlers poisoned")
            .insert(method.to_string(), Box::new(handler));
    }

    pub fn push_event(&self, event: TransportEvent) {
        self.events
            .lock()
            .expect("stub events poisoned")
            .push(event);
    }

    /// `(method, session_id)` pairs in issue order, for assertions.
    pub fn recorded_calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().expect("stub calls poisoned").clone()
    }
}

#[async_trait]
impl CdpTransport for StubTransport {
    async fn start(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        // Poll the queue so events pushed after a consumer parked here are
        // still observed.
        loop {
            let popped = {
                let mut guard = self.events.lock().expect("stub events poisoned");
                if guard.is_empty() {
                    None
                } else {
                    Some(guard.remove(0))
                }
            };
            if let Some(event) = popped {
                return Some(event);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, SessionError> {
        let session = match &target {
            CommandTarget::Browser => None,
            CommandTarget::Session(id) => Some(id.clone()),
        };
        self.calls
            .lock()
            .expect("stub calls poisoned")
            .push((method.to_string(), session.clone()));
        let guard = self.handlers.lock().expect("stub handlers poisoned");
        match guard.get(method) {
            Some(handler) => handler(session.as_deref(), &params),
            None => Err(SessionError::protocol(format!(
                "no stub response scripted for {method}"
            ))),
        }
    }
}
