//! Key codes bound to the derived playback operations.
//!
//! Capturing global key events is the host's job; it forwards raw codes to
//! [`crate::CueSession::handle_key`].

use crate::controller::Step;

pub const KEY_F14: u16 = 107;
pub const KEY_F15: u16 = 113;
pub const KEY_F16: u16 = 106;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShortcutAction {
    Previous,
    Replay,
    Next,
}

impl ShortcutAction {
    pub fn step(self) -> Step {
        match self {
            ShortcutAction::Previous => Step::Previous,
            ShortcutAction::Replay => Step::Replay,
            ShortcutAction::Next => Step::Next,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyBindings {
    pub previous: u16,
    pub replay: u16,
    pub next: u16,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            previous: KEY_F14,
            replay: KEY_F15,
            next: KEY_F16,
        }
    }
}

impl KeyBindings {
    pub fn action_for(&self, code: u16) -> Option<ShortcutAction> {
        if code == self.previous {
            Some(ShortcutAction::Previous)
        } else if code == self.replay {
            Some(ShortcutAction::Replay)
        } else if code == self.next {
            Some(ShortcutAction::Next)
        } else {
            None
        }
    }
}
