//! Client connection actor.
//!
//! A [`Client`] owns one connection and runs two loops over it: a read loop
//! feeding the dispatcher and a write loop draining the outbound queue. The
//! write loop is the only writer while both run. When either loop ends the
//! other is dropped, and the client unregisters exactly once: on return, on
//! cancellation, or when a connected client is dropped without running.

use crate::dispatcher::{Dispatcher, Origin};
use crate::envelope::UserId;
use crate::error::{ClientError, ProtocolError};
use crate::hub::{HubHandle, Outbound, Registration, UserProfile};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Default capacity of a client's outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Upper bound for connection timeouts, keeping deadline arithmetic in range.
pub const MAX_WAIT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a new random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A transport frame.
///
/// Ping, pong and close are transport control frames; application envelopes
/// travel as JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close,
}

/// Connection timing and queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Capacity of the outbound queue.
    pub queue_capacity: usize,
    /// Time allowed to write one frame.
    pub write_wait: Duration,
    /// Time allowed between pongs before the connection is considered dead.
    pub pong_wait: Duration,
    /// Interval between pings. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
        }
    }
}

impl ClientConfig {
    /// Bring out-of-range values back into range.
    ///
    /// Waits are capped at [`MAX_WAIT`] and kept non-zero. A ping period that
    /// is zero or not shorter than `pong_wait` falls back to 9/10 of it.
    pub fn normalized(self) -> Self {
        let clamp = |wait: Duration| wait.clamp(Duration::from_millis(1), MAX_WAIT);
        let pong_wait = clamp(self.pong_wait);
        let ping_period = if self.ping_period.is_zero() || self.ping_period >= pong_wait {
            pong_wait * 9 / 10
        } else {
            self.ping_period
        };
        Self {
            queue_capacity: self.queue_capacity.max(1),
            write_wait: clamp(self.write_wait),
            pong_wait,
            ping_period: ping_period.max(Duration::from_millis(1)),
        }
    }
}

/// Why a connection ended.
#[derive(Debug)]
pub enum Disconnect {
    /// The peer closed the connection.
    PeerClosed,
    /// The hub closed the outbound queue.
    QueueClosed,
    /// A read or write failed.
    Error(ClientError),
}

impl std::fmt::Display for Disconnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Disconnect::PeerClosed => write!(f, "peer closed"),
            Disconnect::QueueClosed => write!(f, "queue closed"),
            Disconnect::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Unregisters its connection from the hub when dropped.
struct RegistrationGuard {
    hub: HubHandle,
    user_id: UserId,
    client_id: ClientId,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        debug!(user_id = self.user_id, client_id = %self.client_id, "Releasing registration");
        self.hub.unregister(self.user_id, self.client_id);
    }
}

/// A registered connection, ready to run.
///
/// Dropping a `Client`, or the future returned by [`Client::run`], removes
/// the connection from the hub.
pub struct Client {
    id: ClientId,
    profile: UserProfile,
    queue: mpsc::Receiver<Outbound>,
    registration: RegistrationGuard,
    dispatcher: Arc<Dispatcher>,
    config: ClientConfig,
}

impl Client {
    /// Create a client for an authenticated user and register it with the hub.
    pub async fn connect(
        hub: HubHandle,
        dispatcher: Arc<Dispatcher>,
        profile: UserProfile,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let config = config.normalized();
        let id = ClientId::new();
        let (sender, queue) = mpsc::channel(config.queue_capacity);

        hub.register(Registration {
            client_id: id,
            profile: profile.clone(),
            sender,
        })
        .await?;

        info!(user_id = profile.user_id, client_id = %id, "Client connected");

        Ok(Self {
            registration: RegistrationGuard {
                hub,
                user_id: profile.user_id,
                client_id: id,
            },
            id,
            profile,
            queue,
            dispatcher,
            config,
        })
    }

    /// Connection ID.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Owner of the connection.
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Run both loops until the connection ends, then unregister.
    ///
    /// A peer that closes the connection gets a Close frame back.
    pub async fn run<S, K, E>(self, stream: S, mut sink: K) -> Disconnect
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: Display,
        K: Sink<Frame> + Unpin,
        K::Error: Display,
    {
        let Client {
            id,
            profile,
            queue,
            registration,
            dispatcher,
            config,
        } = self;
        let origin = Origin {
            user_id: profile.user_id,
            client_id: id,
        };

        let reason = tokio::select! {
            reason = read_loop(stream, &dispatcher, origin, &config) => reason,
            reason = write_loop(queue, &mut sink, &config) => reason,
        };

        drop(registration);

        if matches!(reason, Disconnect::PeerClosed) {
            // Best effort; the peer may already be gone.
            let _ = send(&mut sink, Frame::Close, config.write_wait).await;
        }

        info!(user_id = profile.user_id, client_id = %id, reason = %reason, "Client disconnected");
        reason
    }
}

async fn read_loop<S, E>(
    mut stream: S,
    dispatcher: &Dispatcher,
    origin: Origin,
    config: &ClientConfig,
) -> Disconnect
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let frame = match time::timeout_at(deadline, stream.next()).await {
            Err(_) => return Disconnect::Error(ClientError::ReadTimeout),
            Ok(None) => return Disconnect::PeerClosed,
            Ok(Some(Err(e))) => return Disconnect::Error(ClientError::Transport(e.to_string())),
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Frame::Text(text) => dispatcher.handle_frame(origin, &text).await,
            Frame::Pong(_) => deadline = Instant::now() + config.pong_wait,
            Frame::Binary(_) => dispatcher.reject(origin, &ProtocolError::BinaryFrame).await,
            // Answered by the transport.
            Frame::Ping(_) => {}
            Frame::Close => return Disconnect::PeerClosed,
        }
    }
}

async fn write_loop<K>(
    mut queue: mpsc::Receiver<Outbound>,
    sink: &mut K,
    config: &ClientConfig,
) -> Disconnect
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    let mut ping = time::interval_at(Instant::now() + config.ping_period, config.ping_period);

    loop {
        let frame = tokio::select! {
            outbound = queue.recv() => match outbound {
                Some(envelope) => match serde_json::to_string(&*envelope) {
                    Ok(text) => Frame::Text(text),
                    Err(e) => return Disconnect::Error(ClientError::Serialization(e)),
                },
                None => {
                    // Best effort; the connection is going away either way.
                    let _ = send(sink, Frame::Close, config.write_wait).await;
                    return Disconnect::QueueClosed;
                }
            },
            _ = ping.tick() => Frame::Ping(Bytes::new()),
        };

        if let Err(e) = send(sink, frame, config.write_wait).await {
            return Disconnect::Error(e);
        }
    }
}

async fn send<K>(sink: &mut K, frame: Frame, write_wait: Duration) -> Result<(), ClientError>
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    match time::timeout(write_wait, sink.send(frame)).await {
        Err(_) => Err(ClientError::WriteTimeout),
        Ok(Err(e)) => Err(ClientError::Transport(e.to_string())),
        Ok(Ok(())) => Ok(()),
    }
}
