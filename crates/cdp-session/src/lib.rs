//! Chrome DevTools Protocol session layer.
//!
//! Owns the websocket transport, the per-target session pool, and frame
//! discovery across out-of-process iframes. Consumers acquire a
//! [`PooledSession`] for a target and issue raw protocol commands through
//! it; retries, backoff, and metrics are handled here.

pub mod chromium;
pub mod config;
pub mod error;
pub mod frames;
pub mod launch;
pub mod metrics;
pub mod pool;
pub mod transport;

pub use chromium::ChromiumTransport;
pub use config::{detect_chrome_executable, SessionConfig};
pub use error::SessionError;
pub use frames::{DiscoveredFrames, FrameDiscovery};
pub use pool::{PooledSession, SessionPool};
pub use transport::{
    CdpTransport, CommandTarget, NoopTransport, StubTransport, TransportEvent,
};
