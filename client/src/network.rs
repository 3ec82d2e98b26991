use crate::console::{self, Command};
use crate::replica::{Dispatch, Mode, ReplicaController};
use log::{debug, error, info, warn};
use shared::{read_packet, write_packet, Action, Packet};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events from the reader task, tagged with the connection they came from
#[derive(Debug)]
pub enum ClientEvent {
    Packet { epoch: u64, packet: Packet },
    Closed { epoch: u64 },
}

struct Connection {
    epoch: u64,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// A peer that can mirror the server or simulate on its own
///
/// Each connection gets a new epoch. Events carrying any other epoch belong
/// to a connection that was already torn down and are discarded, so a
/// switch to local simulation can never be followed by a stale broadcast.
pub struct Client {
    server_addr: String,
    replica: ReplicaController,
    connection: Option<Connection>,
    epoch: u64,

    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events_rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Client {
    /// Creates an offline client simulating locally from `{0, 0}`.
    /// No connection is attempted until [`Client::go_online`].
    pub fn new(server_addr: &str) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Client {
            server_addr: server_addr.to_string(),
            replica: ReplicaController::new(),
            connection: None,
            epoch: 0,
            events_tx,
            events_rx,
        }
    }

    /// Read access to the state copy and presence list
    pub fn replica(&self) -> &ReplicaController {
        &self.replica
    }

    /// Returns true while a connection to the server is open
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Enters replica mode and opens a fresh connection.
    ///
    /// The local copy is discarded until the server's handshake arrives. If
    /// the connection cannot be opened the client stays in local simulation.
    pub async fn go_online(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.replica.mode() == Mode::Replica && self.is_connected() {
            return Ok(());
        }

        self.connection = None;
        self.replica.enter_replica();

        info!("Connecting to {}...", self.server_addr);
        let stream = match TcpStream::connect(&self.server_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                self.replica.enter_local();
                return Err(e.into());
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        self.epoch += 1;
        let epoch = self.epoch;
        let (read_half, writer) = stream.into_split();
        let reader = tokio::spawn(Self::read_loop(epoch, read_half, self.events_tx.clone()));

        self.connection = Some(Connection {
            epoch,
            writer,
            reader,
        });

        Ok(())
    }

    /// Closes the connection and keeps simulating from the last known state
    pub fn go_offline(&mut self) {
        if self.connection.take().is_some() {
            info!("Disconnected from server");
        }
        self.replica.enter_local();
    }

    async fn read_loop(
        epoch: u64,
        mut read_half: OwnedReadHalf,
        events_tx: mpsc::UnboundedSender<ClientEvent>,
    ) {
        loop {
            match read_packet(&mut read_half).await {
                Ok(Some(packet)) => {
                    if events_tx.send(ClientEvent::Packet { epoch, packet }).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_malformed() => warn!("Ignoring malformed frame: {}", e),
                Err(e) => {
                    debug!("Read error: {}", e);
                    break;
                }
            }
        }

        let _ = events_tx.send(ClientEvent::Closed { epoch });
    }

    /// Dispatches a local action through the controller.
    ///
    /// In replica mode the action goes to the server and nothing changes
    /// until the resulting broadcast arrives.
    pub async fn dispatch(&mut self, action: Action) -> Dispatch {
        let dispatch = self.replica.dispatch(action);

        if let Dispatch::Forward(action) = dispatch {
            let Some(connection) = self.connection.as_mut() else {
                debug!("Not connected, dropping {}", action);
                return dispatch;
            };

            let result = write_packet(&mut connection.writer, &Packet::action(action)).await;
            if let Err(e) = result {
                error!("Failed to send {}: {}", action, e);
                self.drop_connection();
            }
        }

        dispatch
    }

    /// Forgets a connection that failed on its own.
    ///
    /// The controller stays in replica mode, but the copy it held came from
    /// that connection and is discarded until a new handshake arrives.
    fn drop_connection(&mut self) {
        self.connection = None;
        self.replica.enter_replica();
    }

    /// Applies one reader event. Returns `true` if the controller's visible
    /// state or presence changed.
    pub fn handle_event(&mut self, event: ClientEvent) -> bool {
        let current = self.connection.as_ref().map(|c| c.epoch);

        match event {
            ClientEvent::Packet { epoch, packet } => {
                if Some(epoch) != current {
                    debug!("Discarding packet from stale connection {}", epoch);
                    return false;
                }
                self.replica.handle_packet(packet)
            }
            ClientEvent::Closed { epoch } => {
                if Some(epoch) != current {
                    return false;
                }
                warn!("Lost connection to server");
                self.drop_connection();
                true
            }
        }
    }

    /// Waits for the next reader event and applies it
    pub async fn poll_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event),
            None => false,
        }
    }

    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Action(action) => {
                if let Dispatch::Applied { changed: true } = self.dispatch(action).await {
                    println!("{}", console::render_status(&self.replica));
                }
            }
            Command::Online => {
                if let Err(e) = self.go_online().await {
                    error!("Failed to connect to {}: {}", self.server_addr, e);
                }
                println!("{}", console::render_status(&self.replica));
            }
            Command::Offline => {
                self.go_offline();
                println!("{}", console::render_status(&self.replica));
            }
            Command::Status => {
                println!("{}", console::render_status(&self.replica));
                if self.replica.mode() == Mode::Replica {
                    println!("{}", console::render_presence(&self.replica));
                }
            }
            Command::Help => println!("{}", console::HELP),
            Command::Quit => return false,
        }
        true
    }

    /// Runs until `quit` or until the console input closes
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<String>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", console::HELP);
        println!("{}", console::render_status(&self.replica));

        loop {
            tokio::select! {
                line = commands.recv() => {
                    let Some(line) = line else { break };
                    match Command::parse(&line) {
                        Ok(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        Err(e) => println!("{} ({})", e, console::HELP),
                    }
                },

                Some(event) = self.events_rx.recv() => {
                    let presence_update = matches!(
                        event,
                        ClientEvent::Packet { packet: Packet::UpdateUserList { .. }, .. }
                    );
                    if self.handle_event(event) {
                        println!("{}", console::render_status(&self.replica));
                        if presence_update {
                            println!("{}", console::render_presence(&self.replica));
                        }
                    }
                },
            }
        }

        self.go_offline();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::SharedState;

    #[test]
    fn test_client_starts_offline() {
        let client = Client::new("127.0.0.1:1");
        assert!(!client.is_connected());
        assert_eq!(client.replica().mode(), Mode::LocalSimulation);
    }

    #[tokio::test]
    async fn test_offline_dispatch_is_local() {
        let mut client = Client::new("127.0.0.1:1");

        assert_eq!(
            client.dispatch(Action::Fill).await,
            Dispatch::Applied { changed: true }
        );
        assert_eq!(client.replica().state(), Some(SharedState::new(2, 0)));
    }

    #[tokio::test]
    async fn test_failed_connect_stays_local() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = Client::new(&addr.to_string());
        client.dispatch(Action::Heat).await;

        assert!(client.go_online().await.is_err());
        assert!(!client.is_connected());
        assert_eq!(client.replica().mode(), Mode::LocalSimulation);
        assert_eq!(client.replica().state(), Some(SharedState::new(0, 2)));
    }

    #[tokio::test]
    async fn test_connection_loss_drops_baseline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = Client::new(&listener.local_addr().unwrap().to_string());

        client.go_online().await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();
        write_packet(
            &mut stream,
            &Packet::Init {
                state: SharedState::new(20, 30),
                identity: "127.***.0.***".to_string(),
                presence: vec!["127.***.0.***".to_string()],
            },
        )
        .await
        .unwrap();

        assert!(client.poll_event().await);
        assert_eq!(client.replica().state(), Some(SharedState::new(20, 30)));

        drop(stream);
        assert!(client.poll_event().await);

        assert!(!client.is_connected());
        assert_eq!(client.replica().mode(), Mode::Replica);
        assert_eq!(client.replica().state(), None);
        assert_eq!(client.replica().presence_count(), 0);
    }

    #[test]
    fn test_stale_close_is_ignored() {
        let mut client = Client::new("127.0.0.1:1");
        client.replica.enter_replica();
        client.replica.handle_packet(Packet::Init {
            state: SharedState::new(8, 8),
            identity: "x".to_string(),
            presence: vec![],
        });

        assert!(!client.handle_event(ClientEvent::Closed { epoch: 5 }));
        assert_eq!(client.replica().state(), Some(SharedState::new(8, 8)));
    }

    #[test]
    fn test_stale_events_are_discarded() {
        let mut client = Client::new("127.0.0.1:1");
        client.replica.enter_replica();

        let applied = client.handle_event(ClientEvent::Packet {
            epoch: 3,
            packet: Packet::Init {
                state: SharedState::new(50, 50),
                identity: "x".to_string(),
                presence: vec![],
            },
        });

        assert!(!applied);
        assert_eq!(client.replica().state(), None);
    }
}
