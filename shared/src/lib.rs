use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;

pub use codec::{read_packet, write_packet, CodecError, MAX_FRAME_LEN};

pub const MIN_LEVEL: u8 = 0;
pub const MAX_LEVEL: u8 = 100;
pub const ACTION_STEP: u8 = 2;
pub const DEFAULT_PORT: u16 = 3000;

/// The two bounded quantities every peer observes.
///
/// Both fields stay inside `MIN_LEVEL..=MAX_LEVEL`. The only way to change
/// them is [`SharedState::apply`], which is used verbatim by the server's
/// authoritative store and by a client running in local-simulation mode,
/// so the two can never drift apart in how they interpret an action.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedState {
    pub fill_level: u8,
    pub temperature: u8,
}

impl SharedState {
    pub fn new(fill_level: u8, temperature: u8) -> Self {
        Self {
            fill_level: fill_level.min(MAX_LEVEL),
            temperature: temperature.min(MAX_LEVEL),
        }
    }

    /// Applies one action and reports whether a field actually moved.
    ///
    /// A saturated action (FILL at 100, COOL at 0, ...) leaves the state
    /// untouched and returns `false`.
    pub fn apply(&mut self, action: Action) -> bool {
        let field = match action {
            Action::Fill | Action::Drain => &mut self.fill_level,
            Action::Heat | Action::Cool => &mut self.temperature,
        };

        let next = step(*field, action.is_increase());
        if next == *field {
            return false;
        }

        *field = next;
        true
    }
}

fn step(value: u8, increase: bool) -> u8 {
    if increase {
        value.saturating_add(ACTION_STEP).min(MAX_LEVEL)
    } else {
        value.saturating_sub(ACTION_STEP).max(MIN_LEVEL)
    }
}

impl fmt::Display for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level={:>3} temp={:>3}",
            self.fill_level, self.temperature
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Fill,
    Drain,
    Heat,
    Cool,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Fill, Action::Drain, Action::Heat, Action::Cool];

    /// Wire tag of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Fill => "FILL",
            Action::Drain => "DRAIN",
            Action::Heat => "HEAT",
            Action::Cool => "COOL",
        }
    }

    /// Parses a wire tag. Tags are exact and case-sensitive; anything else
    /// yields `None` and is meant to be dropped by the caller.
    pub fn from_tag(tag: &str) -> Option<Action> {
        match tag {
            "FILL" => Some(Action::Fill),
            "DRAIN" => Some(Action::Drain),
            "HEAT" => Some(Action::Heat),
            "COOL" => Some(Action::Cool),
            _ => None,
        }
    }

    fn is_increase(&self) -> bool {
        matches!(self, Action::Fill | Action::Heat)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Handshake snapshot, unicast once to a newly active connection
    Init {
        state: SharedState,
        identity: String,
        presence: Vec<String>,
    },
    Update {
        state: SharedState,
    },
    UpdateUserList {
        presence: Vec<String>,
    },

    /// Raw action tag from a peer; parsed with [`Action::from_tag`] on arrival
    Action {
        action: String,
    },
}

impl Packet {
    pub fn action(action: Action) -> Self {
        Packet::Action {
            action: action.as_str().to_string(),
        }
    }
}
