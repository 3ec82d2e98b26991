//! Best-effort fan-out to every active connection
//!
//! Broadcasts go to all active connections, the sender included, so the
//! peer that caused a change converges through the same `Update` path as
//! everyone else. Connections still waiting for their handshake are skipped,
//! and a send to a connection whose writer has gone away is ignored.

use crate::client_manager::ClientManager;
use log::debug;
use shared::{Packet, SharedState};

/// Delivers a packet to every active connection. Returns how many queues
/// accepted it.
pub fn broadcast(clients: &ClientManager, packet: &Packet) -> usize {
    let mut delivered = 0;

    for client in clients.active_clients() {
        if client.send(packet.clone()) {
            delivered += 1;
        } else {
            debug!("Skipping dead connection {} during broadcast", client.id);
        }
    }

    delivered
}

/// Sends the current state to every active connection.
///
/// Called after an action changed the store, never for a saturated one.
pub fn broadcast_state(clients: &ClientManager, state: SharedState) -> usize {
    broadcast(clients, &Packet::Update { state })
}

/// Sends the full presence snapshot to every active connection.
///
/// Called after every connect and disconnect. The snapshot is sent whole,
/// so a peer never has to merge partial lists.
pub fn broadcast_presence(clients: &ClientManager, presence: Vec<String>) -> usize {
    broadcast(clients, &Packet::UpdateUserList { presence })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn init_packet() -> Packet {
        Packet::Init {
            state: SharedState::default(),
            identity: "x".to_string(),
            presence: vec![],
        }
    }

    #[test]
    fn test_broadcast_reaches_all_active() {
        let mut clients = ClientManager::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        clients.add_client(1, None, "a".to_string(), tx1);
        clients.add_client(2, None, "b".to_string(), tx2);
        clients.activate(1, init_packet());
        clients.activate(2, init_packet());

        let delivered = broadcast_state(&clients, SharedState::new(2, 0));
        assert_eq!(delivered, 2);

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(rx.try_recv().unwrap(), Packet::Init { .. }));
            assert_eq!(
                rx.try_recv().unwrap(),
                Packet::Update {
                    state: SharedState::new(2, 0)
                }
            );
        }
    }

    #[test]
    fn test_dead_connection_does_not_abort_fanout() {
        let mut clients = ClientManager::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        clients.add_client(1, None, "a".to_string(), tx1);
        clients.add_client(2, None, "b".to_string(), tx2);
        clients.activate(1, init_packet());
        clients.activate(2, init_packet());
        drop(rx1);

        let delivered = broadcast_presence(&clients, vec!["b".to_string()]);
        assert_eq!(delivered, 1);

        rx2.try_recv().unwrap();
        assert_eq!(
            rx2.try_recv().unwrap(),
            Packet::UpdateUserList {
                presence: vec!["b".to_string()]
            }
        );
    }

    #[test]
    fn test_connecting_client_receives_nothing() {
        let mut clients = ClientManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        clients.add_client(1, None, "a".to_string(), tx);

        assert_eq!(broadcast_state(&clients, SharedState::default()), 0);
        assert!(rx.try_recv().is_err());
    }
}
