//! Real-time event channel.
//!
//! - [`hub::EventHub`] fans named events out to subscribers
//! - [`socket::RealtimeClient`] keeps an authenticated Socket.IO connection
//!   to the broker and publishes everything it receives into the hub
//!
//! The connection is tied to the session: it opens when a token becomes
//! active and closes when the session is cleared.

pub mod hub;
pub mod socket;

use std::fmt;
use std::time::Duration;

use url::Url;

pub use hub::{Event, EventHub, Subscription};
pub use socket::RealtimeClient;

/// Default number of reconnection attempts after a drop.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay between reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Default timeout for the WebSocket and namespace handshakes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Broker origin (`http(s)://` or `ws(s)://`). A bare origin gets the
    /// default `/socket.io/` path.
    pub url: Url,
    /// Reconnection attempts after a drop before giving up.
    pub reconnect_attempts: u32,
    /// Delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Timeout for each handshake step.
    pub connect_timeout: Duration,
}

impl RealtimeConfig {
    /// Default parameters for `url`.
    #[must_use]
    pub const fn new(url: Url) -> Self {
        Self {
            url,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Observable state of the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// Handshaking; `attempt` is 0 for the first try and counts
    /// reconnection attempts after that.
    Connecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Connected and receiving events.
    Connected,
    /// Reconnection attempts are exhausted or the broker refused the token.
    /// Only an explicit reconnect or a new token leaves this state.
    GaveUp,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting { attempt: 0 } => write!(f, "connecting"),
            Self::Connecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Connected => write!(f, "connected"),
            Self::GaveUp => write!(f, "offline"),
        }
    }
}

/// Errors from the event channel.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// The broker URL cannot be turned into a WebSocket URL.
    #[error("invalid broker url: {0}")]
    InvalidUrl(String),

    /// A handshake step or the heartbeat timed out.
    #[error("event channel timed out")]
    Timeout,

    /// The WebSocket failed.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] taskdeck_proto::packet::PacketError),

    /// The server sent something unexpected during the handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The broker refused the namespace connection (bad or expired token).
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// The connection closed.
    #[error("connection closed")]
    Closed,
}
