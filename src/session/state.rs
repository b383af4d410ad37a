//! Session lifecycle states.

use std::fmt;

/// Lifecycle of a [`Session`](super::Session).
///
/// States only move forward:
/// `New -> Connected -> Disconnecting -> Disconnected`, with `New` also able to
/// go straight to `Disconnecting` when a session is evicted before any
/// transport binds to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Allocated by the handshake; no transport has bound yet.
    New,
    Connected,
    /// Queues are being closed and the session unregistered.
    Disconnecting,
    Disconnected,
}

impl SessionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
        }
    }

    /// Whether the session can still exchange messages.
    #[must_use]
    pub fn is_live(self) -> bool { matches!(self, Self::New | Self::Connected) }

    /// Whether moving from `self` to `next` is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::Connected | Self::Disconnecting)
                | (Self::Connected, Self::Disconnecting)
                | (Self::Disconnecting, Self::Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
