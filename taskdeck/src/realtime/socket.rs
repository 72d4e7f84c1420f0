//! Socket.IO client over a single WebSocket.
//!
//! The handshake runs in three steps: the Engine.IO `open` packet, the
//! namespace connect carrying `{ "token": ... }`, then the server's connect
//! acknowledgement. After that the link answers pings and publishes every
//! event into the [`EventHub`].
//!
//! A dropped link is retried up to `reconnect_attempts` times with a fixed
//! delay; a successful connection resets the budget. A connect error from
//! the broker means the token was refused and is not retried.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use taskdeck_proto::packet::{self, EnginePacket, Handshake, SocketPacket};

use super::{ConnectionState, EventHub, RealtimeConfig, RealtimeError};
use crate::session::{SessionState, SessionStore};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Link {
    token: String,
    task: JoinHandle<()>,
}

/// Authenticated connection to the event broker.
///
/// At most one link is alive at a time; connecting with a new token tears
/// the previous link down first.
pub struct RealtimeClient {
    config: RealtimeConfig,
    hub: EventHub,
    state: Arc<watch::Sender<ConnectionState>>,
    link: Mutex<Option<Link>>,
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.config.url.as_str())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl RealtimeClient {
    /// Creates a disconnected client with its own hub.
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        Self::with_hub(config, EventHub::new())
    }

    /// Creates a disconnected client that publishes into `hub`.
    #[must_use]
    pub fn with_hub(config: RealtimeConfig, hub: EventHub) -> Self {
        Self {
            config,
            hub,
            state: Arc::new(watch::Sender::new(ConnectionState::Disconnected)),
            link: Mutex::new(None),
        }
    }

    /// The hub incoming events are published into.
    #[must_use]
    pub const fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watches connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Opens a link authenticated with `token`, replacing any existing one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, token: &str) {
        let mut link = self.link.lock();
        if let Some(old) = link.take() {
            old.task.abort();
        }
        tracing::debug!(url = %self.config.url, "opening event channel");
        let task = tokio::spawn(run_link(
            self.config.clone(),
            token.to_string(),
            self.hub.clone(),
            Arc::clone(&self.state),
        ));
        *link = Some(Link {
            token: token.to_string(),
            task,
        });
    }

    /// Closes the link, if any.
    pub fn disconnect(&self) {
        if let Some(old) = self.link.lock().take() {
            old.task.abort();
            tracing::info!("event channel closed");
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Restarts the link with the last token, resetting the retry budget.
    ///
    /// Returns `false` if there is no token to reconnect with.
    pub fn reconnect(&self) -> bool {
        let token = self.link.lock().as_ref().map(|l| l.token.clone());
        match token {
            Some(token) => {
                self.connect(&token);
                true
            }
            None => false,
        }
    }

    pub(crate) fn current_token(&self) -> Option<String> {
        self.link.lock().as_ref().map(|l| l.token.clone())
    }

    /// Ties the link to `session`: connect while a token is active,
    /// disconnect when it is cleared.
    ///
    /// The returned task ends when the session store is dropped or this
    /// client is.
    pub fn follow_session(self: &Arc<Self>, session: &SessionStore) -> JoinHandle<()> {
        let client: Weak<Self> = Arc::downgrade(self);
        let mut rx = session.subscribe();
        tokio::spawn(async move {
            loop {
                let state = rx.borrow_and_update().clone();
                let Some(client) = client.upgrade() else {
                    break;
                };
                match state {
                    SessionState::Active(session) => {
                        if client.current_token().as_deref() != Some(session.token()) {
                            client.connect(session.token());
                        }
                    }
                    SessionState::Absent | SessionState::Unchecked => {
                        if client.current_token().is_some() {
                            client.disconnect();
                        }
                    }
                }
                drop(client);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(link) = self.link.get_mut().take() {
            link.task.abort();
        }
    }
}

/// Builds the Engine.IO WebSocket URL for a broker origin.
///
/// # Errors
///
/// Returns [`RealtimeError::InvalidUrl`] for schemes other than
/// `http`, `https`, `ws` and `wss`.
pub fn socket_url(base: &Url) -> Result<Url, RealtimeError> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(RealtimeError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|()| RealtimeError::InvalidUrl(base.to_string()))?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path("/socket.io/");
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

async fn run_link(
    config: RealtimeConfig,
    token: String,
    hub: EventHub,
    state: Arc<watch::Sender<ConnectionState>>,
) {
    let mut retries = 0;
    let mut first = true;
    loop {
        if !first {
            if retries >= config.reconnect_attempts {
                tracing::warn!(retries, "event channel reconnection attempts exhausted");
                state.send_replace(ConnectionState::GaveUp);
                return;
            }
            retries += 1;
            tokio::time::sleep(config.reconnect_delay).await;
        }
        first = false;

        state.send_replace(ConnectionState::Connecting { attempt: retries });
        match open(&config, &token).await {
            Ok((ws, handshake)) => {
                retries = 0;
                tracing::info!(sid = %handshake.sid, "event channel connected");
                state.send_replace(ConnectionState::Connected);
                match pump(ws, &handshake, &hub).await {
                    Ok(()) => {
                        tracing::info!("broker closed the event channel");
                        state.send_replace(ConnectionState::Disconnected);
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, "event channel dropped");
                        state.send_replace(ConnectionState::Disconnected);
                    }
                }
            }
            Err(RealtimeError::Rejected(reason)) => {
                tracing::warn!(%reason, "broker rejected the session token");
                state.send_replace(ConnectionState::GaveUp);
                return;
            }
            Err(e) => {
                tracing::warn!(err = %e, attempt = retries, "event channel connect failed");
            }
        }
    }
}

/// Runs the three handshake steps.
async fn open(
    config: &RealtimeConfig,
    token: &str,
) -> Result<(WsStream, Handshake), RealtimeError> {
    let url = socket_url(&config.url)?;
    let (mut ws, _response) =
        tokio::time::timeout(config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| RealtimeError::Timeout)?
            .map_err(|e| RealtimeError::WebSocket(e.to_string()))?;

    let handshake = match next_packet(&mut ws, Some(config.connect_timeout)).await? {
        EnginePacket::Open(handshake) => handshake,
        other => {
            return Err(RealtimeError::Handshake(format!(
                "expected open packet, got {other:?}"
            )));
        }
    };

    let auth = serde_json::json!({ "token": token });
    send_packet(&mut ws, &EnginePacket::Message(SocketPacket::connect(Some(auth)))).await?;

    loop {
        match next_packet(&mut ws, Some(config.connect_timeout)).await? {
            EnginePacket::Message(SocketPacket::Connect { .. }) => return Ok((ws, handshake)),
            EnginePacket::Message(SocketPacket::ConnectError { message, .. }) => {
                return Err(RealtimeError::Rejected(message));
            }
            EnginePacket::Ping(data) => send_packet(&mut ws, &EnginePacket::Pong(data)).await?,
            EnginePacket::Close => return Err(RealtimeError::Closed),
            other => tracing::debug!(?other, "ignoring packet before namespace connect"),
        }
    }
}

/// Reads frames until the link ends, answering pings and publishing events.
///
/// Returns `Ok` only when the broker disconnects us from the namespace.
async fn pump(
    mut ws: WsStream,
    handshake: &Handshake,
    hub: &EventHub,
) -> Result<(), RealtimeError> {
    let idle = handshake.ping_interval + handshake.ping_timeout;
    let deadline = (idle > 0).then(|| Duration::from_millis(idle));
    loop {
        let packet = match next_packet(&mut ws, deadline).await {
            Ok(packet) => packet,
            Err(RealtimeError::Protocol(e)) => {
                tracing::warn!(err = %e, "malformed frame, skipping");
                continue;
            }
            Err(e) => return Err(e),
        };
        match packet {
            EnginePacket::Ping(data) => send_packet(&mut ws, &EnginePacket::Pong(data)).await?,
            EnginePacket::Message(SocketPacket::Event { name, payload, .. }) => {
                hub.publish(&name, payload);
            }
            EnginePacket::Message(SocketPacket::Disconnect { .. }) => return Ok(()),
            EnginePacket::Close => return Err(RealtimeError::Closed),
            other => tracing::trace!(?other, "ignoring packet"),
        }
    }
}

/// Reads the next text frame and decodes it.
async fn next_packet(
    ws: &mut WsStream,
    deadline: Option<Duration>,
) -> Result<EnginePacket, RealtimeError> {
    loop {
        let next = match deadline {
            Some(limit) => tokio::time::timeout(limit, ws.next())
                .await
                .map_err(|_| RealtimeError::Timeout)?,
            None => ws.next().await,
        };
        match next {
            Some(Ok(Message::Text(text))) => return Ok(packet::decode(text.as_str())?),
            Some(Ok(Message::Close(_))) | None => return Err(RealtimeError::Closed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(RealtimeError::WebSocket(e.to_string())),
        }
    }
}

async fn send_packet(ws: &mut WsStream, packet: &EnginePacket) -> Result<(), RealtimeError> {
    let frame = packet::encode(packet)?;
    ws.send(Message::text(frame))
        .await
        .map_err(|e| RealtimeError::WebSocket(e.to_string()))
}
