//! Client-side copy of the shared state with its two operating modes
//!
//! In replica mode the controller mirrors the server: local actions are only
//! forwarded, and the copy changes when a broadcast arrives. In
//! local-simulation mode it applies the same clamp rule as the server
//! directly. Leaving local simulation never merges anything; the next
//! handshake replaces the copy wholesale.

use log::debug;
use shared::{Action, Packet, SharedState};

/// Where the controller's copy of the state comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mirrors the server; local actions are forwarded
    Replica,
    /// Applies local actions directly, ignoring the server
    LocalSimulation,
}

/// What happened to a locally dispatched action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Must be sent to the server; nothing changed locally
    Forward(Action),
    /// Applied to the local copy
    Applied { changed: bool },
}

#[derive(Debug, Clone)]
pub struct ReplicaController {
    mode: Mode,
    /// Last known copy; frozen here when leaving replica mode
    state: SharedState,
    /// In replica mode, whether a handshake has established the baseline
    synced: bool,
    identity: Option<String>,
    presence: Vec<String>,
}

impl ReplicaController {
    /// Starts disconnected, simulating locally from `{0, 0}`
    pub fn new() -> Self {
        Self::with_state(SharedState::default())
    }

    pub fn with_state(state: SharedState) -> Self {
        Self {
            mode: Mode::LocalSimulation,
            state,
            synced: false,
            identity: None,
            presence: Vec::new(),
        }
    }

    /// Returns the current operating mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns true when in replica mode with a baseline from a handshake.
    /// Broadcasts are only honoured while this holds.
    pub fn is_synced(&self) -> bool {
        self.mode == Mode::Replica && self.synced
    }

    /// The state to display. `None` while a replica waits for its handshake.
    pub fn state(&self) -> Option<SharedState> {
        match self.mode {
            Mode::LocalSimulation => Some(self.state),
            Mode::Replica if self.synced => Some(self.state),
            Mode::Replica => None,
        }
    }

    /// This peer's masked identity as reported by the server's handshake
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Identities from the most recent presence snapshot.
    ///
    /// Always empty in local-simulation mode and before the handshake.
    pub fn presence(&self) -> &[String] {
        &self.presence
    }

    /// Number of distinct identities currently connected to the server
    pub fn presence_count(&self) -> usize {
        self.presence.len()
    }

    /// Switches to mirroring the server. The current copy stops being
    /// authoritative until the next `Init` arrives.
    pub fn enter_replica(&mut self) {
        self.mode = Mode::Replica;
        self.synced = false;
        self.identity = None;
        self.presence.clear();
    }

    /// Switches to local simulation, continuing from the last known copy.
    /// Broadcasts arriving after this point are ignored.
    pub fn enter_local(&mut self) {
        self.mode = Mode::LocalSimulation;
        self.synced = false;
        self.identity = None;
        self.presence.clear();
    }

    /// Handles a locally triggered action.
    ///
    /// In replica mode the copy is left alone and the caller is told to
    /// forward the action. In local-simulation mode the shared clamp rule
    /// is applied on the spot.
    pub fn dispatch(&mut self, action: Action) -> Dispatch {
        match self.mode {
            Mode::Replica => Dispatch::Forward(action),
            Mode::LocalSimulation => Dispatch::Applied {
                changed: self.state.apply(action),
            },
        }
    }

    /// Replaces the copy with a fresh handshake snapshot
    pub fn apply_init(&mut self, state: SharedState, identity: String, presence: Vec<String>) -> bool {
        if self.mode != Mode::Replica {
            debug!("Ignoring handshake in local-simulation mode");
            return false;
        }

        self.state = SharedState::new(state.fill_level, state.temperature);
        self.identity = Some(identity);
        self.presence = presence;
        self.synced = true;
        true
    }

    /// Overwrites the copy with a broadcast state. Returns `false` if the
    /// broadcast was not honoured.
    pub fn apply_update(&mut self, state: SharedState) -> bool {
        if !self.is_synced() {
            debug!("Ignoring state update without a baseline");
            return false;
        }

        self.state = SharedState::new(state.fill_level, state.temperature);
        true
    }

    /// Replaces the presence list with a broadcast snapshot
    pub fn apply_presence(&mut self, presence: Vec<String>) -> bool {
        if !self.is_synced() {
            return false;
        }

        self.presence = presence;
        true
    }

    /// Routes a packet from the server to the matching handler
    pub fn handle_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::Init {
                state,
                identity,
                presence,
            } => self.apply_init(state, identity, presence),
            Packet::Update { state } => self.apply_update(state),
            Packet::UpdateUserList { presence } => self.apply_presence(presence),
            Packet::Action { .. } => false,
        }
    }
}

impl Default for ReplicaController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn init(state: SharedState) -> Packet {
        Packet::Init {
            state,
            identity: "127.***.0.***".to_string(),
            presence: vec!["127.***.0.***".to_string()],
        }
    }

    #[test]
    fn test_starts_in_local_simulation() {
        let replica = ReplicaController::new();
        assert_eq!(replica.mode(), Mode::LocalSimulation);
        assert_eq!(replica.state(), Some(SharedState::default()));
        assert_eq!(replica.presence_count(), 0);
        assert!(replica.identity().is_none());
    }

    #[test]
    fn test_local_dispatch_applies_clamp_rule() {
        let mut replica = ReplicaController::with_state(SharedState::new(98, 0));

        assert_eq!(
            replica.dispatch(Action::Fill),
            Dispatch::Applied { changed: true }
        );
        assert_eq!(
            replica.dispatch(Action::Fill),
            Dispatch::Applied { changed: false }
        );
        assert_eq!(
            replica.dispatch(Action::Cool),
            Dispatch::Applied { changed: false }
        );
        assert_eq!(replica.state(), Some(SharedState::new(100, 0)));
    }

    #[test]
    fn test_replica_dispatch_only_forwards() {
        let mut replica = ReplicaController::new();
        replica.enter_replica();
        replica.handle_packet(init(SharedState::new(10, 10)));

        assert_eq!(replica.dispatch(Action::Heat), Dispatch::Forward(Action::Heat));
        assert_eq!(replica.state(), Some(SharedState::new(10, 10)));
    }

    #[test]
    fn test_entering_replica_waits_for_handshake() {
        let mut replica = ReplicaController::with_state(SharedState::new(40, 40));
        replica.enter_replica();

        assert_eq!(replica.state(), None);
        assert!(!replica.handle_packet(Packet::Update {
            state: SharedState::new(2, 2)
        }));
        assert!(!replica.handle_packet(Packet::UpdateUserList {
            presence: vec!["x".to_string()]
        }));
        assert_eq!(replica.state(), None);

        assert!(replica.handle_packet(init(SharedState::new(6, 8))));
        assert_eq!(replica.state(), Some(SharedState::new(6, 8)));
        assert_eq!(replica.identity(), Some("127.***.0.***"));
        assert_eq!(replica.presence_count(), 1);
    }

    #[test]
    fn test_updates_overwrite_copy() {
        let mut replica = ReplicaController::new();
        replica.enter_replica();
        replica.handle_packet(init(SharedState::new(0, 0)));

        assert!(replica.handle_packet(Packet::Update {
            state: SharedState::new(50, 20)
        }));
        assert_eq!(replica.state(), Some(SharedState::new(50, 20)));

        assert!(replica.handle_packet(Packet::UpdateUserList {
            presence: vec!["a".to_string(), "b".to_string()]
        }));
        assert_eq!(replica.presence_count(), 2);
    }

    #[test]
    fn test_local_mode_ignores_broadcasts() {
        let mut replica = ReplicaController::new();
        replica.enter_replica();
        replica.handle_packet(init(SharedState::new(30, 30)));
        replica.enter_local();

        assert!(!replica.handle_packet(Packet::Update {
            state: SharedState::new(90, 90)
        }));
        assert!(!replica.handle_packet(init(SharedState::new(90, 90))));
        assert_eq!(replica.state(), Some(SharedState::new(30, 30)));
        assert_eq!(replica.presence_count(), 0);
    }

    #[test]
    fn test_local_mode_continues_from_frozen_state() {
        let mut replica = ReplicaController::new();
        replica.enter_replica();
        replica.handle_packet(init(SharedState::new(30, 30)));
        replica.handle_packet(Packet::Update {
            state: SharedState::new(32, 30),
        });

        replica.enter_local();
        replica.dispatch(Action::Fill);

        assert_eq!(replica.state(), Some(SharedState::new(34, 30)));
    }

    #[test]
    fn test_handshake_replaces_divergent_copy() {
        let mut replica = ReplicaController::new();
        for _ in 0..10 {
            replica.dispatch(Action::Heat);
        }
        assert_eq!(replica.state(), Some(SharedState::new(0, 20)));

        replica.enter_replica();
        replica.handle_packet(init(SharedState::new(4, 2)));

        assert_eq!(replica.state(), Some(SharedState::new(4, 2)));
    }

    #[test]
    fn test_leaving_replica_before_handshake_keeps_last_copy() {
        let mut replica = ReplicaController::with_state(SharedState::new(12, 14));
        replica.enter_replica();
        replica.enter_local();

        assert_eq!(replica.state(), Some(SharedState::new(12, 14)));
    }

    #[test]
    fn test_incoming_state_is_clamped() {
        let mut replica = ReplicaController::new();
        replica.enter_replica();
        replica.handle_packet(init(SharedState {
            fill_level: 250,
            temperature: 101,
        }));

        assert_eq!(replica.state(), Some(SharedState::new(100, 100)));
    }

    #[test]
    fn test_local_simulation_matches_authority() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut authority = SharedState::new(50, 50);
        let mut replica = ReplicaController::with_state(SharedState::new(50, 50));

        for _ in 0..5_000 {
            let action = Action::ALL[rng.gen_range(0..Action::ALL.len())];
            let changed = authority.apply(action);

            assert_eq!(replica.dispatch(action), Dispatch::Applied { changed });
            assert_eq!(replica.state(), Some(authority));
        }
    }
}
