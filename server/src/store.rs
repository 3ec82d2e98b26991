//! Authoritative copy of the shared state
//!
//! The server's main loop owns exactly one [`StateStore`] and is the only
//! writer. Everything else reads copies obtained through [`StateStore::snapshot`].

use log::{debug, info};
use shared::{Action, SharedState};

#[derive(Debug, Default)]
pub struct StateStore {
    state: SharedState,
    applied: u64,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the store from a given state instead of `{0, 0}`
    pub fn with_state(state: SharedState) -> Self {
        Self { state, applied: 0 }
    }

    /// Applies one action with the shared clamp rule.
    ///
    /// Returns `true` only if a field actually moved; the caller broadcasts
    /// on `true` and does nothing otherwise.
    pub fn apply(&mut self, action: Action) -> bool {
        let changed = self.state.apply(action);

        if changed {
            self.applied += 1;
            info!(
                "[Action] {} -> Level: {}, Temp: {}",
                action, self.state.fill_level, self.state.temperature
            );
        } else {
            debug!("[Action] {} saturated, state unchanged", action);
        }

        changed
    }

    /// Returns a copy of the current state.
    ///
    /// The copy never reflects a half-applied action, since only the
    /// server loop calls [`StateStore::apply`].
    pub fn snapshot(&self) -> SharedState {
        self.state
    }

    /// Number of actions that changed the state since startup.
    /// Saturated actions are not counted.
    pub fn applied_count(&self) -> u64 {
        self.applied
    }
}
