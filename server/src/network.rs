//! Server network layer handling TCP connections and the serialized event loop

use crate::broadcast::{broadcast_presence, broadcast_state};
use crate::client_manager::ClientManager;
use crate::identity::mask_ip;
use crate::presence::PresenceRegistry;
use crate::store::StateStore;
use log::{debug, error, info, warn};
use shared::{read_packet, write_packet, Action, CodecError, Packet, SharedState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        client_id: u32,
        addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<Packet>,
    },
    PacketReceived {
        client_id: u32,
        packet: Packet,
    },
    Disconnected {
        client_id: u32,
    },
    Shutdown,
}

/// Stops a running [`Server`] from another task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    /// Asks the server loop to stop. Open connections are closed once the
    /// loop exits. Calling this on a stopped server does nothing.
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Authoritative server owning the shared state, presence set and connections
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: ClientManager,
    store: StateStore,
    presence: PresenceRegistry,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listener with the store starting at `{0, 0}`
    pub async fn new(addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_state(addr, SharedState::default()).await
    }

    /// Binds the listener and starts the store from `state`
    pub async fn with_state(
        addr: &str,
        state: SharedState,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: ClientManager::new(),
            store: StateStore::with_state(state),
            presence: PresenceRegistry::new(),
            server_tx,
            server_rx,
        })
    }

    /// Address the listener is bound to, with the real port when bound to 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a handle that can stop [`Server::run`] from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns the task accepting connections.
    ///
    /// Reader tasks live in a `JoinSet` owned by the acceptor, so aborting the
    /// acceptor also stops every reader.
    fn spawn_acceptor(&mut self) -> Result<JoinHandle<()>, Box<dyn std::error::Error>> {
        let listener = self
            .listener
            .take()
            .ok_or("server listener already consumed")?;
        let server_tx = self.server_tx.clone();

        Ok(tokio::spawn(async move {
            let mut readers = JoinSet::new();
            let mut next_client_id: u32 = 1;

            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            let client_id = next_client_id;
                            next_client_id = next_client_id.wrapping_add(1);

                            let read_half = Self::spawn_connection(client_id, stream, &server_tx);
                            readers.spawn(Self::read_loop(client_id, read_half, server_tx.clone()));
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    },
                    Some(_) = readers.join_next(), if !readers.is_empty() => {}
                }
            }
        }))
    }

    /// Splits a fresh stream, starts its writer task and announces it to the
    /// main loop. The read half is handed back to the caller.
    fn spawn_connection(
        client_id: u32,
        stream: TcpStream,
        server_tx: &mpsc::UnboundedSender<ServerMessage>,
    ) -> OwnedReadHalf {
        let addr = stream.peer_addr().ok();
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for client {}: {}", client_id, e);
        }

        let (read_half, write_half) = stream.into_split();
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(Self::write_loop(client_id, write_half, receiver));

        if let Err(e) = server_tx.send(ServerMessage::Connected {
            client_id,
            addr,
            sender,
        }) {
            error!("Failed to announce client {}: {}", client_id, e);
        }

        read_half
    }

    /// Forwards packets from one connection until it closes
    async fn read_loop(
        client_id: u32,
        mut read_half: OwnedReadHalf,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        loop {
            match read_packet(&mut read_half).await {
                Ok(Some(packet)) => {
                    if server_tx
                        .send(ServerMessage::PacketReceived { client_id, packet })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_malformed() => {
                    warn!("Ignoring malformed frame from client {}: {}", client_id, e);
                }
                Err(e) => {
                    debug!("Connection {} closed: {}", client_id, e);
                    break;
                }
            }
        }

        let _ = server_tx.send(ServerMessage::Disconnected { client_id });
    }

    /// Drains one connection's outbound queue onto its socket.
    ///
    /// A packet that cannot be encoded into a frame is dropped and the loop
    /// moves on to the next one. Only an I/O error ends the writer.
    async fn write_loop(
        client_id: u32,
        mut write_half: OwnedWriteHalf,
        mut receiver: mpsc::UnboundedReceiver<Packet>,
    ) {
        while let Some(packet) = receiver.recv().await {
            match write_packet(&mut write_half, &packet).await {
                Ok(()) => {}
                Err(CodecError::Io(e)) => {
                    debug!("Failed to send to client {}: {}", client_id, e);
                    break;
                }
                // nothing reached the socket, so the stream is still aligned
                Err(e) => warn!("Dropping unsendable packet for client {}: {}", client_id, e),
            }
        }
    }

    /// Registers a connection, sends its handshake and announces it
    fn handle_connect(
        &mut self,
        client_id: u32,
        addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<Packet>,
    ) {
        let identity = mask_ip(addr);
        self.clients
            .add_client(client_id, addr, identity.clone(), sender);
        self.presence.add(&identity);

        let handshake = Packet::Init {
            state: self.store.snapshot(),
            identity,
            presence: self.presence.snapshot(),
        };
        self.clients.activate(client_id, handshake);

        broadcast_presence(&self.clients, self.presence.snapshot());
    }

    fn handle_packet(&mut self, client_id: u32, packet: Packet) {
        match packet {
            Packet::Action { action } => {
                if !self.clients.accept_action(client_id) {
                    debug!("Dropping action from inactive client {}", client_id);
                    return;
                }

                let Some(action) = Action::from_tag(&action) else {
                    debug!("Ignoring unknown action {:?} from client {}", action, client_id);
                    return;
                };

                if self.store.apply(action) {
                    broadcast_state(&self.clients, self.store.snapshot());
                }
            }
            _ => {
                warn!("Unexpected packet type from client {}", client_id);
            }
        }
    }

    fn handle_disconnect(&mut self, client_id: u32) {
        if let Some(client) = self.clients.remove_client(client_id) {
            self.presence.remove(&client.identity);
            broadcast_presence(&self.clients, self.presence.snapshot());
        }
    }

    /// Main server loop. Every state, presence and connection change happens
    /// here, one message at a time.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let acceptor = self.spawn_acceptor()?;

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::Connected {
                    client_id,
                    addr,
                    sender,
                } => self.handle_connect(client_id, addr, sender),
                ServerMessage::PacketReceived { client_id, packet } => {
                    self.handle_packet(client_id, packet)
                }
                ServerMessage::Disconnected { client_id } => self.handle_disconnect(client_id),
                ServerMessage::Shutdown => {
                    info!(
                        "Server shutting down after {} applied actions",
                        self.store.applied_count()
                    );
                    break;
                }
            }
        }

        acceptor.abort();
        let closed = self.clients.clear();
        if closed > 0 {
            info!("Closed {} open connections", closed);
        }

        Ok(())
    }
}
