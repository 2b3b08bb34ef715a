//! Presence channel configuration and state machine.

use std::time::Duration;

use rxlive_backoff::BackoffConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PresenceConfig
// ---------------------------------------------------------------------------

/// Configuration for a presence channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceConfig {
    /// Upper bound for a single connection attempt, handshake included.
    /// An attempt that takes longer counts as failed.
    pub connect_timeout: Duration,

    /// How long a clean close may take before the socket is just dropped.
    pub close_timeout: Duration,

    /// Reconnect delays after a lost connection or failed attempt.
    pub backoff: BackoffConfig,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
            backoff: BackoffConfig::default(),
        }
    }
}

impl PresenceConfig {
    /// Sets the per-attempt connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the clean-close timeout.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Sets the reconnect backoff.
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces zero timeouts with the defaults and validates the backoff.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.connect_timeout.is_zero() {
            tracing::warn!("connect_timeout of zero would fail every attempt, using default");
            self.connect_timeout = defaults.connect_timeout;
        }
        if self.close_timeout.is_zero() {
            self.close_timeout = defaults.close_timeout;
        }
        self.backoff = self.backoff.validated();
        self
    }
}

// ---------------------------------------------------------------------------
// ChannelState
// ---------------------------------------------------------------------------

/// The lifecycle state of a presence channel.
///
/// ```text
/// Disconnected → Connecting → Connected ⇄ Reconnecting
///                     └───────────────────→ Reconnecting
/// (any active state) → Disconnected
/// ```
///
/// - **Disconnected**: no socket, no presence data. The state of a
///   stopped or unscoped client, and of one whose session is not valid.
/// - **Connecting**: first attempt in progress; no presence data yet.
/// - **Connected**: handshake done, presence events flowing.
/// - **Reconnecting**: the connection was lost or an attempt failed;
///   waiting out the backoff or retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ChannelState {
    /// Returns `true` only in [`Connected`](Self::Connected).
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while the channel holds or is trying to get a socket.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    ///
    /// Every active state may fall back to `Disconnected`; only
    /// `Disconnected` may start a first attempt.
    pub fn can_transition_to(self, target: Self) -> bool {
        use ChannelState::*;
        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected | Reconnecting | Disconnected)
                | (Connected, Reconnecting | Disconnected)
                | (Reconnecting, Connected | Disconnected)
        )
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_state_transitions() {
        use ChannelState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connected));
        assert!(Reconnecting.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Reconnecting));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Reconnecting.can_transition_to(Connecting));
        assert!(!Connected.can_transition_to(Connected));
    }

    #[test]
    fn test_channel_state_predicates() {
        assert!(ChannelState::Connected.is_connected());
        assert!(!ChannelState::Reconnecting.is_connected());
        assert!(!ChannelState::Disconnected.is_active());
        assert!(ChannelState::Connecting.is_active());
        assert!(ChannelState::Reconnecting.is_active());
    }

    #[test]
    fn test_channel_state_display() {
        assert_eq!(ChannelState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ChannelState::Reconnecting.to_string(), "Reconnecting");
    }

    #[test]
    fn test_presence_config_default() {
        let config = PresenceConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.backoff.base, Duration::from_secs(1));
        assert_eq!(config.backoff.cap, Duration::from_secs(30));
    }

    #[test]
    fn test_validated_restores_zero_timeouts() {
        let config = PresenceConfig::default()
            .connect_timeout(Duration::ZERO)
            .close_timeout(Duration::ZERO)
            .validated();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.close_timeout, Duration::from_secs(2));
    }
}
