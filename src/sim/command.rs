//! Commands that drive the tick engine
//!
//! Commands arrive from outside the simulation (local input, network) and are
//! applied in the order given. On the wire they are tagged by a `type` field.

use serde::{Deserialize, Serialize};

/// Identifies a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u32);

/// Held-button bitmask
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Buttons(pub u32);

impl Buttons {
    pub const FORWARD: Buttons = Buttons(1 << 0);
    pub const BACK: Buttons = Buttons(1 << 1);
    pub const LEFT: Buttons = Buttons(1 << 2);
    pub const RIGHT: Buttons = Buttons(1 << 3);
    pub const USE: Buttons = Buttons(1 << 4);
    pub const JUMP: Buttons = Buttons(1 << 5);

    pub const NONE: Buttons = Buttons(0);

    #[inline]
    pub const fn contains(self, other: Buttons) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Buttons) -> Buttons {
        Buttons(self.0 | other.0)
    }

    /// Buttons held now that were not held before
    #[inline]
    pub const fn newly_pressed(self, previous: Buttons) -> Buttons {
        Buttons(self.0 & !previous.0)
    }

    /// -1, 0 or 1 along an axis driven by a positive and a negative button
    pub fn axis(self, positive: Buttons, negative: Buttons) -> f32 {
        match (self.contains(positive), self.contains(negative)) {
            (true, false) => 1.0,
            (false, true) => -1.0,
            _ => 0.0,
        }
    }
}

impl std::ops::BitOr for Buttons {
    type Output = Buttons;

    fn bitor(self, rhs: Buttons) -> Buttons {
        self.union(rhs)
    }
}

/// One tick of player input
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPayload {
    /// Pitch change (radians, positive looks up)
    pub pitch: f32,
    /// Yaw change (radians, positive turns left)
    pub yaw: f32,
    pub buttons: Buttons,
    /// Buttons pressed this tick; derived from the previous held mask when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressed_mask: Option<Buttons>,
}

impl InputPayload {
    pub fn held(buttons: Buttons) -> Self {
        Self {
            buttons,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerAction {
    Add,
    Remove,
}

/// Input to the tick engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Player input for the tick numbered `clock`
    Input {
        #[serde(rename = "clientID")]
        client_id: ClientId,
        clock: u64,
        input: InputPayload,
    },
    /// Join or leave
    Player {
        #[serde(rename = "clientID")]
        client_id: ClientId,
        action: PlayerAction,
    },
}

impl Command {
    pub fn input(client_id: ClientId, clock: u64, input: InputPayload) -> Self {
        Command::Input {
            client_id,
            clock,
            input,
        }
    }

    pub fn join(client_id: ClientId) -> Self {
        Command::Player {
            client_id,
            action: PlayerAction::Add,
        }
    }

    pub fn leave(client_id: ClientId) -> Self {
        Command::Player {
            client_id,
            action: PlayerAction::Remove,
        }
    }

    pub fn client_id(&self) -> ClientId {
        match self {
            Command::Input { client_id, .. } | Command::Player { client_id, .. } => *client_id,
        }
    }
}
