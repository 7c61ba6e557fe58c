use thiserror::Error;

/// Errors surfaced by the session layer.
///
/// Only `FatalConnection` is allowed to abort an extraction cycle; everything
/// else is either retriable at the call site or recoverable by continuing
/// with fewer frames.
#[derive(Clone, Debug, Error)]
pub enum SessionError {
    /// A wire call failed. `retriable` marks rate-limit-like conditions that
    /// are worth another attempt with backoff.
    #[error("protocol failure: {hint}")]
    Protocol { hint: String, retriable: bool },

    /// A wire call exceeded its deadline.
    #[error("protocol call timed out: {0}")]
    Timeout(String),

    /// The target vanished mid-attach or mid-discovery. Recoverable: the
    /// caller proceeds with whatever frames were resolved.
    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),

    /// No viable transport to the browser. Halts extraction entirely.
    #[error("no connection to browser: {0}")]
    FatalConnection(String),
}

impl SessionError {
    pub fn protocol(hint: impl Into<String>) -> Self {
        Self::Protocol {
            hint: hint.into(),
            retriable: false,
        }
    }

    pub fn retriable(hint: impl Into<String>) -> Self {
        Self::Protocol {
            hint: hint.into(),
            retriable: true,
        }
    }

    pub fn fatal(hint: impl Into<String>) -> Self {
        Self::FatalConnection(hint.into())
    }

    /// Whether a local retry with backoff is worthwhile.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Protocol {
                retriable: true,
                ..
            } | Self::Timeout(_)
        )
    }

    /// Whether discovery may continue without this target.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::FatalConnection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retriable_but_fatal_is_not() {
        assert!(SessionError::Timeout("x".into()).is_retriable());
        assert!(!SessionError::fatal("gone").is_retriable());
        assert!(!SessionError::fatal("gone").is_recoverable());
        assert!(SessionError::FrameUnavailable("f".into()).is_recoverable());
    }
}
