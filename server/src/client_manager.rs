//! Connection tracking for the authoritative server
//!
//! This module handles the server-side bookkeeping of every open connection:
//! - The per-connection lifecycle (`Connecting → Active → Closed`)
//! - The outbound packet queue each connection's writer task drains
//! - Which connections are eligible to receive broadcasts
//!
//! Presence is tracked separately by identity; this registry is keyed by
//! connection id, so two connections from the same origin are two entries
//! here but one entry in the presence set.

use log::info;
use shared::Packet;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Lifecycle of one connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

/// A connected peer and the queue feeding its socket
#[derive(Debug)]
pub struct Client {
    /// Server-assigned id, unique per physical connection
    pub id: u32,
    /// Remote address, if the transport could resolve one
    pub addr: Option<SocketAddr>,
    /// Anonymised identity registered in the presence set
    pub identity: String,
    /// Where this connection is in its lifecycle
    pub state: ConnectionState,
    /// Number of actions accepted from this connection, reported on disconnect
    pub actions_received: u64,
    sender: mpsc::UnboundedSender<Packet>,
}

impl Client {
    /// Creates a client entry in the `Connecting` state.
    ///
    /// # Arguments
    /// * `id` - Server-assigned connection id
    /// * `addr` - Remote address, `None` if it could not be resolved
    /// * `identity` - Masked identity used for presence
    /// * `sender` - Queue drained by this connection's writer task
    pub fn new(
        id: u32,
        addr: Option<SocketAddr>,
        identity: String,
        sender: mpsc::UnboundedSender<Packet>,
    ) -> Self {
        Self {
            id,
            addr,
            identity,
            state: ConnectionState::Connecting,
            actions_received: 0,
            sender,
        }
    }

    /// Returns true once the handshake has been queued. Only active clients
    /// receive broadcasts or may submit actions.
    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    /// Queues a packet for this connection.
    ///
    /// Returns `false` if the connection is closed or its writer task is
    /// gone. Callers treat that as a skipped delivery, never as an error.
    pub fn send(&self, packet: Packet) -> bool {
        self.state != ConnectionState::Closed && self.sender.send(packet).is_ok()
    }
}

/// Manages all open connections
///
/// Only the server's main loop touches the manager, which keeps state
/// transitions and broadcast iteration serialized with state mutation.
#[derive(Debug, Default)]
pub struct ClientManager {
    clients: HashMap<u32, Client>,
}

impl ClientManager {
    /// Creates an empty manager with no connections
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection in the `Connecting` state
    pub fn add_client(
        &mut self,
        id: u32,
        addr: Option<SocketAddr>,
        identity: String,
        sender: mpsc::UnboundedSender<Packet>,
    ) {
        info!("[Connect] User: {} (ID: {})", identity, id);
        self.clients
            .insert(id, Client::new(id, addr, identity, sender));
    }

    /// Sends the handshake to a connecting client and marks it active.
    ///
    /// The handshake is queued before the state flips, so it is always the
    /// first packet on that connection's queue. Returns `false` if the
    /// client is unknown or not in the `Connecting` state.
    pub fn activate(&mut self, id: u32, handshake: Packet) -> bool {
        match self.clients.get_mut(&id) {
            Some(client) if client.state == ConnectionState::Connecting => {
                client.send(handshake);
                client.state = ConnectionState::Active;
                true
            }
            _ => false,
        }
    }

    /// Counts an incoming action and reports whether it may be applied
    pub fn accept_action(&mut self, id: u32) -> bool {
        match self.clients.get_mut(&id) {
            Some(client) if client.is_active() => {
                client.actions_received += 1;
                true
            }
            _ => false,
        }
    }

    /// Closes and removes a connection, returning it in the `Closed` state.
    ///
    /// Dropping the returned client drops its queue sender, which ends the
    /// writer task and closes the socket.
    pub fn remove_client(&mut self, id: u32) -> Option<Client> {
        let mut client = self.clients.remove(&id)?;
        client.state = ConnectionState::Closed;
        info!(
            "[Disconnect] User: {} (ID: {}, {} actions)",
            client.identity, client.id, client.actions_received
        );
        Some(client)
    }

    /// Closes every connection, returning how many were open
    pub fn clear(&mut self) -> usize {
        let closed = self.clients.len();
        self.clients.clear();
        closed
    }

    /// Active connections at the time of the call.
    ///
    /// Connections still waiting for their handshake are left out, which is
    /// what keeps a broadcast from overtaking a handshake.
    pub fn active_clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values().filter(|client| client.is_active())
    }

    /// Returns the number of open connections, including ones still connecting.
    ///
    /// Two connections sharing a masked identity count twice here.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no connection is open
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
