//! The hub: sole owner of the online-client registry.
//!
//! Every registration, unregistration, delivery and snapshot is a message
//! into one loop. The loop owns the `user -> connections` map outright, so
//! nothing else can observe it mid-update and no lock guards it.

use crate::client::ClientId;
use crate::envelope::{Envelope, UserId};
use crate::error::RealtimeError;
use crate::presence::{OnlineUser, PresenceChange, PresenceStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Default capacity of the hub's command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// Default capacity of the presence broadcast channel.
pub const DEFAULT_PRESENCE_CAPACITY: usize = 256;

/// An envelope queued for a connection. Shared between all recipients of a fan-out.
pub type Outbound = Arc<Envelope>;

/// Hub tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the route/deliver/snapshot command channel.
    pub command_capacity: usize,
    /// Capacity of the presence change broadcast channel.
    pub presence_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            presence_capacity: DEFAULT_PRESENCE_CAPACITY,
        }
    }
}

/// Display metadata of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User ID.
    pub user_id: UserId,
    /// Username shown to other users.
    pub username: String,
    /// Avatar reference, if the user has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A connection asking to join the registry.
#[derive(Debug)]
pub struct Registration {
    /// Connection ID.
    pub client_id: ClientId,
    /// Owner of the connection.
    pub profile: UserProfile,
    /// Sending half of the connection's bounded outbound queue.
    pub sender: mpsc::Sender<Outbound>,
}

/// Hub statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    /// Users with at least one connection.
    pub online_users: usize,
    /// Currently registered connections.
    pub current_connections: usize,
    /// Connections registered since start.
    pub total_connections: u64,
    /// Envelopes accepted into outbound queues.
    pub messages_delivered: u64,
    /// Envelopes dropped because a queue was full.
    pub messages_dropped: u64,
    /// Connections closed for falling behind.
    pub slow_consumer_disconnects: u64,
}

struct RegisterRequest {
    registration: Registration,
    ack: oneshot::Sender<()>,
}

struct Unregistration {
    user_id: UserId,
    client_id: ClientId,
}

pub(crate) enum Command {
    Route {
        envelope: Outbound,
        targets: Vec<UserId>,
    },
    Deliver {
        user_id: UserId,
        client_id: ClientId,
        envelope: Outbound,
    },
    OnlineUsers {
        reply: oneshot::Sender<Vec<OnlineUser>>,
    },
    ConnectionCount {
        user_id: UserId,
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

struct Connection {
    profile: UserProfile,
    sender: mpsc::Sender<Outbound>,
}

enum Offer {
    Queued,
    Full,
    Closed,
}

impl Connection {
    fn offer(&self, envelope: &Outbound) -> Offer {
        match self.sender.try_send(envelope.clone()) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Full(_)) => Offer::Full,
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }
}

/// The hub event loop.
///
/// Construct it once at startup with [`Hub::new`], spawn [`Hub::run`], and
/// hand clones of the returned [`HubHandle`] to everything that needs it.
pub struct Hub {
    clients: HashMap<UserId, HashMap<ClientId, Connection>>,
    register_rx: mpsc::UnboundedReceiver<RegisterRequest>,
    unregister_rx: mpsc::UnboundedReceiver<Unregistration>,
    command_rx: mpsc::Receiver<Command>,
    presence_tx: broadcast::Sender<PresenceChange>,
    stats: HubStats,
}

impl Hub {
    /// Create the hub loop and its handle.
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (presence_tx, _) = broadcast::channel(config.presence_capacity.max(1));

        let hub = Self {
            clients: HashMap::new(),
            register_rx,
            unregister_rx,
            command_rx,
            presence_tx: presence_tx.clone(),
            stats: HubStats::default(),
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            command_tx,
            presence_tx,
        };
        (hub, handle)
    }

    /// Create the hub and run its loop on the current tokio runtime.
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (hub, handle) = Self::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// Run the loop until every handle has been dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            tokio::select! {
                biased;

                Some(request) = self.register_rx.recv() => self.register(request),
                Some(request) = self.unregister_rx.recv() => {
                    self.unregister(request.user_id, request.client_id);
                }
                Some(command) = self.command_rx.recv() => self.handle(command),
                else => break,
            }
        }

        info!(connections = self.connection_total(), "Hub stopped");
    }

    fn register(&mut self, request: RegisterRequest) {
        let RegisterRequest { registration, ack } = request;
        let Registration {
            client_id,
            profile,
            sender,
        } = registration;
        let user_id = profile.user_id;

        let connections = self.clients.entry(user_id).or_default();
        let first = connections.is_empty();
        connections.insert(client_id, Connection { profile, sender });
        let count = connections.len();
        self.stats.total_connections += 1;

        debug!(user_id, client_id = %client_id, connections = count, "Client registered");
        if first {
            self.publish(user_id, PresenceStatus::Online);
        }

        // The connection gave up before it could run; it will never unregister itself.
        if ack.send(()).is_err() {
            self.unregister(user_id, client_id);
        }
    }

    /// Remove a connection and close its queue. Returns false if it was not registered.
    fn unregister(&mut self, user_id: UserId, client_id: ClientId) -> bool {
        let Some(connections) = self.clients.get_mut(&user_id) else {
            return false;
        };
        if connections.remove(&client_id).is_none() {
            return false;
        }

        let remaining = connections.len();
        debug!(user_id, client_id = %client_id, connections = remaining, "Client unregistered");

        if remaining == 0 {
            self.clients.remove(&user_id);
            self.publish(user_id, PresenceStatus::Offline);
        }
        true
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Route { envelope, targets } => self.route(envelope, targets),
            Command::Deliver {
                user_id,
                client_id,
                envelope,
            } => self.deliver(user_id, client_id, envelope),
            Command::OnlineUsers { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::ConnectionCount { user_id, reply } => {
                let count = self.clients.get(&user_id).map_or(0, HashMap::len);
                let _ = reply.send(count);
            }
            Command::Stats { reply } => {
                let mut stats = self.stats.clone();
                stats.online_users = self.clients.len();
                stats.current_connections = self.connection_total();
                let _ = reply.send(stats);
            }
        }
    }

    fn route(&mut self, envelope: Outbound, targets: Vec<UserId>) {
        let mut seen = HashSet::with_capacity(targets.len());
        let mut evicted = Vec::new();
        let mut delivered = 0usize;

        for user_id in targets {
            if !seen.insert(user_id) {
                continue;
            }
            let Some(connections) = self.clients.get(&user_id) else {
                continue;
            };
            for (client_id, connection) in connections {
                match connection.offer(&envelope) {
                    Offer::Queued => delivered += 1,
                    offer => evicted.push((user_id, *client_id, matches!(offer, Offer::Full))),
                }
            }
        }

        self.stats.messages_delivered += delivered as u64;
        for (user_id, client_id, overflowed) in evicted {
            self.evict(user_id, client_id, overflowed);
        }

        debug!(
            kind = %envelope.kind,
            recipients = delivered,
            "Envelope routed"
        );
    }

    fn deliver(&mut self, user_id: UserId, client_id: ClientId, envelope: Outbound) {
        let offer = match self
            .clients
            .get(&user_id)
            .and_then(|connections| connections.get(&client_id))
        {
            Some(connection) => connection.offer(&envelope),
            None => return,
        };

        match offer {
            Offer::Queued => self.stats.messages_delivered += 1,
            Offer::Full => self.evict(user_id, client_id, true),
            Offer::Closed => self.evict(user_id, client_id, false),
        }
    }

    /// Drop a connection that can no longer accept envelopes.
    fn evict(&mut self, user_id: UserId, client_id: ClientId, overflowed: bool) {
        if overflowed {
            self.stats.messages_dropped += 1;
        }
        if !self.unregister(user_id, client_id) {
            return;
        }
        if overflowed {
            self.stats.slow_consumer_disconnects += 1;
            warn!(user_id, client_id = %client_id, "Outbound queue full, disconnecting slow client");
        } else {
            debug!(user_id, client_id = %client_id, "Outbound queue closed, removing client");
        }
    }

    fn snapshot(&self) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self
            .clients
            .iter()
            .filter_map(|(user_id, connections)| {
                connections.values().next().map(|connection| OnlineUser {
                    user_id: *user_id,
                    username: connection.profile.username.clone(),
                    avatar: connection.profile.avatar.clone(),
                    connections: connections.len(),
                })
            })
            .collect();
        users.sort_by_key(|user| user.user_id);
        users
    }

    fn connection_total(&self) -> usize {
        self.clients.values().map(HashMap::len).sum()
    }

    fn publish(&self, user_id: UserId, status: PresenceStatus) {
        info!(user_id, status = %status, "Presence changed");
        // No receivers is fine.
        let _ = self.presence_tx.send(PresenceChange { user_id, status });
    }
}

/// Cloneable handle to the hub loop.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<RegisterRequest>,
    unregister_tx: mpsc::UnboundedSender<Unregistration>,
    command_tx: mpsc::Sender<Command>,
    presence_tx: broadcast::Sender<PresenceChange>,
}

impl HubHandle {
    /// Add a connection to the registry.
    ///
    /// Returns once the hub loop has processed the registration, so a later
    /// [`unregister`](Self::unregister) for the same connection can never
    /// overtake it.
    pub async fn register(&self, registration: Registration) -> Result<(), RealtimeError> {
        let (ack, registered) = oneshot::channel();
        self.register_tx
            .send(RegisterRequest { registration, ack })
            .map_err(|_| RealtimeError::HubClosed)?;
        registered.await.map_err(|_| RealtimeError::HubClosed)
    }

    /// Remove a connection from the registry and close its outbound queue.
    ///
    /// Unregistering a connection that is not registered is a no-op.
    pub fn unregister(&self, user_id: UserId, client_id: ClientId) {
        if self
            .unregister_tx
            .send(Unregistration { user_id, client_id })
            .is_err()
        {
            debug!(user_id, client_id = %client_id, "Hub closed before unregister");
        }
    }

    /// Queue an envelope for every connection of every target user.
    ///
    /// Offline targets are skipped; this never fails because of a recipient.
    pub async fn route(&self, envelope: Envelope, targets: Vec<UserId>) -> Result<(), RealtimeError> {
        self.send(Command::Route {
            envelope: Arc::new(envelope),
            targets,
        })
        .await
    }

    /// Queue an envelope for a single connection.
    pub async fn deliver(
        &self,
        user_id: UserId,
        client_id: ClientId,
        envelope: Envelope,
    ) -> Result<(), RealtimeError> {
        self.send(Command::Deliver {
            user_id,
            client_id,
            envelope: Arc::new(envelope),
        })
        .await
    }

    /// Get hub statistics.
    pub async fn stats(&self) -> Result<HubStats, RealtimeError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Receive presence transitions (first connect, last disconnect).
    pub fn subscribe_presence(&self) -> broadcast::Receiver<PresenceChange> {
        self.presence_tx.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), RealtimeError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RealtimeError::HubClosed)
    }

    pub(crate) async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RealtimeError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| RealtimeError::HubClosed)
    }
}
